//! Wire transport to the engine session
//!
//! The SDK talks to an engine session over a small request/response surface:
//! submit one serialized operation document, get back the engine's envelope
//! (`data` plus optional `errors`). [`Transport`] is the seam between the
//! execution engine and whatever actually moves the bytes; the stock
//! implementation is HTTP via `reqwest`, either against an endpoint the
//! caller already runs or against a session subprocess spawned here.
//!
//! Transports must tolerate concurrent in-flight requests: independent
//! chains executing against the same session are not serialized by the SDK.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};

use crate::error::{Error, Result};

/// How long to wait for the spawned session to print its handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a session subprocess gets to exit after stdin closes before it
/// is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// One application-level error reported by the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineError {
    pub message: String,
}

/// The engine's response envelope for one operation document.
#[derive(Debug, Deserialize, Default)]
pub struct QueryResponse {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub errors: Option<Vec<EngineError>>,
}

/// Request/response boundary to an engine session.
///
/// Implementations are shared behind `Arc` and must support concurrent use.
/// A broken or closed connection surfaces as [`Error::Transport`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit a serialized operation document and await the engine's
    /// envelope. Cancelling the returned future abandons the call locally;
    /// the remote operation may keep running.
    async fn request(&self, query: &str) -> Result<QueryResponse>;
}

impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Transport")
    }
}

/// HTTP transport to a running engine session.
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
    session_token: Option<String>,
}

impl HttpTransport {
    /// Build a transport against `endpoint` (e.g. `http://127.0.0.1:8080/query`).
    ///
    /// `session_token` is sent as HTTP basic auth when present, which is how
    /// spawned sessions authenticate their single client.
    pub fn new(endpoint: impl Into<String>, session_token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Connect(format!("Failed to build HTTP client: {}", e)))?;
        Ok(HttpTransport {
            http,
            endpoint: endpoint.into(),
            session_token,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, query: &str) -> Result<QueryResponse> {
        let body = serde_json::json!({ "query": query });
        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(token) = &self.session_token {
            request = request.basic_auth(token, Option::<&str>::None);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "Engine returned HTTP {}: {}",
                status, text
            )));
        }

        Ok(response.json::<QueryResponse>().await?)
    }
}

/// Handshake line printed by a freshly spawned session subprocess.
#[derive(Debug, Deserialize)]
struct SessionHandshake {
    port: u16,
    session_token: String,
}

/// A session subprocess owned by this connection.
///
/// The session binary prints one JSON handshake line on stdout and serves
/// the query endpoint on the advertised local port until its stdin closes.
pub(crate) struct EngineProcess {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl EngineProcess {
    /// Spawn the session binary and complete the handshake.
    ///
    /// Returns the process handle plus the endpoint URL and session token to
    /// hand to [`HttpTransport`].
    pub(crate) async fn spawn(
        binary: PathBuf,
        args: &[String],
    ) -> Result<(EngineProcess, String, String)> {
        log::debug!("spawning engine session: {:?} {:?}", binary, args);

        let mut child = Command::new(&binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                Error::Connect(format!("Failed to spawn engine session {:?}: {}", binary, e))
            })?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Connect("Engine session has no stdout".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        let line = tokio::time::timeout(HANDSHAKE_TIMEOUT, lines.next_line())
            .await
            .map_err(|_| Error::Connect("Timed out waiting for session handshake".to_string()))?
            .map_err(|e| Error::Connect(format!("Failed to read session handshake: {}", e)))?
            .ok_or_else(|| {
                Error::Connect("Engine session exited before the handshake".to_string())
            })?;

        let handshake: SessionHandshake = serde_json::from_str(&line)
            .map_err(|e| Error::Connect(format!("Malformed session handshake {:?}: {}", line, e)))?;

        // Keep draining stdout so the child never blocks on a full pipe.
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                log::debug!("engine session: {}", line);
            }
        });

        let endpoint = format!("http://127.0.0.1:{}/query", handshake.port);
        Ok((
            EngineProcess {
                child,
                stdin,
            },
            endpoint,
            handshake.session_token,
        ))
    }

    /// Ask the session to exit and wait for it, escalating to a kill if it
    /// outlives the grace period.
    pub(crate) async fn shutdown(mut self) {
        // Closing stdin is the session's termination signal.
        drop(self.stdin.take());

        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                log::debug!("engine session exited: {}", status);
            }
            Ok(Err(e)) => {
                log::warn!("Failed to wait for engine session: {}", e);
            }
            Err(_) => {
                log::warn!("Engine session did not exit in time, killing it");
                if let Err(e) = self.child.kill().await {
                    log::warn!("Failed to kill engine session: {}", e);
                }
            }
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        // Last resort if the connection was never closed properly.
        if let Ok(None) = self.child.try_wait() {
            drop(self.stdin.take());
            let _ = self.child.start_kill();
        }
    }
}
