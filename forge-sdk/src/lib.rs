//! Forge SDK - Rust client for the Forge pipeline engine
//!
//! This crate lets you describe a pipeline of remote operations — build a
//! container, mount a directory, run a command, read its output — as a chain
//! of immutable, lazily evaluated method calls, then execute that chain
//! against a long-lived engine session and get typed results back.
//!
//! Chaining does no I/O: every `with_*` call appends one step to an
//! immutable selection chain and returns a new handle. Only terminal calls
//! (`stdout`, `contents`, `entries`, `id`, `sync`) talk to the engine.
//!
//! # Quick Start
//!
//! ```no_run
//! use forge_sdk::{Config, Connection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), forge_sdk::Error> {
//!     let version = Connection::with(Config::default(), |client| async move {
//!         client
//!             .container()
//!             .from("alpine:3.16.2")
//!             .with_exec(vec!["cat", "/etc/alpine-release"])
//!             .stdout()
//!             .await
//!     })
//!     .await?;
//!
//!     println!("alpine version: {}", version);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   Application Code (Your Rust App)      │
//! └─────────────────────────────────────────┘
//!                  │
//!                  ▼
//! ┌─────────────────────────────────────────┐
//! │  Forge SDK (this crate)                 │
//! │  - Client/Container/Directory handles   │
//! │  - Selection (immutable query chains)   │
//! │  - Connection (session lifecycle)       │
//! │  - Transport (HTTP / spawned session)   │
//! └─────────────────────────────────────────┘
//!                  │  query documents
//!                  ▼
//! ┌─────────────────────────────────────────┐
//! │  Forge Engine (external process)        │
//! │  - container builds & execution         │
//! │  - filesystem operations, caching       │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - [`connection`] - Session lifecycle, configuration, scoped execution
//! - [`api`] - Typed chainable handles (Container, Directory, File, ...)
//! - [`transport`] - Wire transport trait, HTTP transport, session spawning
//! - [`error`] - Error types and handling
//!
//! # Errors
//!
//! Three failures matter to callers: [`Error::Transport`] (the session is
//! closed or broken), [`Error::ExecuteTimeout`] (a call outlived its
//! deadline; the session stays usable), and [`Error::Query`] (the engine
//! rejected the request, message passed through verbatim). None are retried
//! by the SDK.

pub mod api;
pub mod connection;
pub mod error;
pub mod transport;

mod exec;
mod selection;

// Re-export main types for convenience
pub use api::{
    BuildArg, BuildOpts, CacheSharingMode, CacheVolume, Client, Container, ContainerOpts,
    Directory, EntriesOpts, ExportOpts, File, GitOpts, GitRef, GitRepository, Host, MountCacheOpts,
    Platform,
};
pub use connection::{Config, Connection};
pub use error::{Error, Result};
pub use selection::Selection;
pub use transport::{EngineError, HttpTransport, QueryResponse, Transport};
