//! Engine connection and session management
//!
//! This module provides the entry points for talking to a Forge engine. A
//! [`Connection`] owns the transport (and the session subprocess, when it
//! spawned one) and hands out a root [`Client`] handle; every handle chained
//! off that root shares the same session.
//!
//! The session lifecycle is explicit: `Disconnected -> Connecting -> Open ->
//! Closed`. Closing is one-way and idempotent, and any execution attempted
//! after close fails immediately with a transport error without touching the
//! wire.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::api::Client;
use crate::error::{Error, Result};
use crate::transport::{EngineProcess, HttpTransport, Transport};

/// Environment variable naming the session binary to spawn when no endpoint
/// is configured.
pub const SESSION_BINARY_ENV: &str = "FORGE_SESSION";

/// Connection configuration, passed to [`Connection::connect`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use forge_sdk::Config;
///
/// // Attach to an engine session that is already running.
/// let config = Config {
///     endpoint: Some("http://127.0.0.1:8080/query".to_string()),
///     execute_timeout: Some(Duration::from_secs(300)),
///     ..Config::default()
/// };
/// ```
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Query endpoint of an already-running engine session. When unset, a
    /// session subprocess is spawned instead.
    pub endpoint: Option<String>,
    /// Session token for `endpoint`, sent as HTTP basic auth.
    pub session_token: Option<String>,
    /// Session binary to spawn when no endpoint is given. Falls back to the
    /// `FORGE_SESSION` environment variable.
    pub engine_binary: Option<PathBuf>,
    /// Extra arguments for the spawned session binary.
    pub engine_args: Vec<String>,
    /// Default deadline applied to every execution on this session. `None`
    /// means wait indefinitely.
    pub execute_timeout: Option<Duration>,
}

/// Session lifecycle states. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Connecting,
    Open,
    Closed,
}

struct SessionInner {
    transport: Arc<dyn Transport>,
    state: RwLock<SessionState>,
    default_timeout: Option<Duration>,
    /// Present only when this session spawned the engine subprocess.
    process: tokio::sync::Mutex<Option<EngineProcess>>,
}

/// Shared reference to a live session, embedded in every typed handle.
///
/// Handles never own the session; they keep it alive through this shared
/// reference, and once the connection is closed every execution through any
/// surviving handle fails fast.
#[derive(Clone)]
pub(crate) struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Transport accessor guarded by the session state: no execution may
    /// start once `Closed` has been observed.
    pub(crate) fn transport(&self) -> Result<Arc<dyn Transport>> {
        let state = *self.inner.state.read().unwrap_or_else(|e| e.into_inner());
        match state {
            SessionState::Open => Ok(self.inner.transport.clone()),
            SessionState::Closed => Err(Error::Transport(
                "Connection to engine has been closed".to_string(),
            )),
            SessionState::Connecting => Err(Error::Transport(
                "Connection to engine has not been established".to_string(),
            )),
        }
    }

    pub(crate) fn default_timeout(&self) -> Option<Duration> {
        self.inner.default_timeout
    }
}

/// An open connection to a Forge engine session.
///
/// # Examples
///
/// ```no_run
/// use forge_sdk::{Config, Connection};
///
/// # async fn example() -> Result<(), forge_sdk::Error> {
/// let conn = Connection::connect(Config::default()).await?;
/// let client = conn.client();
///
/// let out = client
///     .container()
///     .from("alpine:3.16.2")
///     .with_exec(vec!["echo", "hello"])
///     .stdout()
///     .await?;
///
/// conn.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Connection {
    session: Session,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl Connection {
    /// Establish a session per `config`.
    ///
    /// With an `endpoint` configured this attaches to the running engine
    /// session at that address. Otherwise it spawns the session binary
    /// (`config.engine_binary`, or `$FORGE_SESSION`), completes the
    /// handshake, and connects to the advertised local port.
    pub async fn connect(config: Config) -> Result<Connection> {
        log::debug!("connecting to engine session");

        let (transport, process): (Arc<dyn Transport>, Option<EngineProcess>) =
            match &config.endpoint {
                Some(endpoint) => {
                    let transport =
                        HttpTransport::new(endpoint.clone(), config.session_token.clone())?;
                    (Arc::new(transport), None)
                }
                None => {
                    let binary = config
                        .engine_binary
                        .clone()
                        .or_else(|| std::env::var_os(SESSION_BINARY_ENV).map(PathBuf::from))
                        .ok_or_else(|| {
                            Error::Connect(format!(
                                "No endpoint configured and {} is not set",
                                SESSION_BINARY_ENV
                            ))
                        })?;
                    let (process, endpoint, token) =
                        EngineProcess::spawn(binary, &config.engine_args).await?;
                    let transport = HttpTransport::new(endpoint, Some(token))?;
                    (Arc::new(transport), Some(process))
                }
            };

        let connection = Connection::from_parts(transport, process, &config);
        *connection
            .session
            .inner
            .state
            .write()
            .unwrap_or_else(|e| e.into_inner()) = SessionState::Open;
        log::debug!("engine session open");
        Ok(connection)
    }

    /// Build a connection over a caller-supplied transport.
    ///
    /// This is an escape hatch for embedding and testing; most applications
    /// should use [`Connection::connect`].
    pub fn with_transport(transport: Arc<dyn Transport>, config: &Config) -> Connection {
        let connection = Connection::from_parts(transport, None, config);
        *connection
            .session
            .inner
            .state
            .write()
            .unwrap_or_else(|e| e.into_inner()) = SessionState::Open;
        connection
    }

    fn from_parts(
        transport: Arc<dyn Transport>,
        process: Option<EngineProcess>,
        config: &Config,
    ) -> Connection {
        Connection {
            session: Session {
                inner: Arc::new(SessionInner {
                    transport,
                    state: RwLock::new(SessionState::Connecting),
                    default_timeout: config.execute_timeout,
                    process: tokio::sync::Mutex::new(process),
                }),
            },
        }
    }

    /// Root handle bound to this session. Handles are cheap to clone and
    /// remain valid (though unusable) after the connection closes.
    pub fn client(&self) -> Client {
        Client::root(self.session.clone())
    }

    /// Close the session: no further executions may start, and an owned
    /// engine subprocess is asked to exit (then killed if it lingers).
    ///
    /// Idempotent; executions already in flight are not cancelled remotely.
    pub async fn close(&self) {
        {
            let mut state = self
                .session
                .inner
                .state
                .write()
                .unwrap_or_else(|e| e.into_inner());
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }
        log::debug!("engine session closed");

        if let Some(process) = self.session.inner.process.lock().await.take() {
            process.shutdown().await;
        }
    }

    /// Run `f` against a fresh connection, closing it on every exit path.
    ///
    /// This is the scoped counterpart of [`Connection::connect`]/[`close`]:
    /// the session is torn down whether `f` succeeds or fails.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use forge_sdk::{Config, Connection};
    ///
    /// # async fn example() -> Result<(), forge_sdk::Error> {
    /// let version = Connection::with(Config::default(), |client| async move {
    ///     client
    ///         .container()
    ///         .from("alpine:3.16.2")
    ///         .with_exec(vec!["cat", "/etc/alpine-release"])
    ///         .stdout()
    ///         .await
    /// })
    /// .await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// [`close`]: Connection::close
    pub async fn with<F, Fut, T>(config: Config, f: F) -> Result<T>
    where
        F: FnOnce(Client) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let connection = Connection::connect(config).await?;
        let result = f(connection.client()).await;
        connection.close().await;
        result
    }
}
