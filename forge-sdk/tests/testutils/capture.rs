//! Log capture for asserting on warning output
//!
//! Installs a process-global logger that records every warning. Use from a
//! dedicated test binary so unrelated tests don't interleave their records.

use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;

static CAPTURE: Lazy<CaptureLogger> = Lazy::new(|| CaptureLogger {
    records: Mutex::new(Vec::new()),
});

struct CaptureLogger {
    records: Mutex<Vec<String>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.records
                .lock()
                .unwrap()
                .push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

/// Install the capturing logger. Safe to call more than once.
pub fn init() {
    let _ = log::set_logger(&*CAPTURE);
    log::set_max_level(LevelFilter::Warn);
}

/// Drain and return everything captured since the last call.
pub fn drain() -> Vec<String> {
    std::mem::take(&mut *CAPTURE.records.lock().unwrap())
}
