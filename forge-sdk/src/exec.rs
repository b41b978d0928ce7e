//! Query execution
//!
//! Turns a selection chain into one engine round trip: resolve handle-valued
//! arguments to IDs, serialize the chain, submit it through the session's
//! transport under the execution deadline, then decode the response envelope
//! and walk the return path down to the requested value.
//!
//! There is no client-side caching or dedup here. Structurally identical
//! chains each trigger their own round trip; the engine owns caching.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::connection::Session;
use crate::error::{Error, Result};
use crate::selection::{build_document, Arg, RenderedField, Selection};

/// Execute `selection` and decode the return-path leaf into `T`.
pub(crate) async fn execute<T: DeserializeOwned>(
    session: &Session,
    selection: &Selection,
    timeout: Option<Duration>,
) -> Result<T> {
    let value = execute_value(session, selection, timeout).await?;
    serde_json::from_value(value).map_err(Error::from)
}

/// Execute `selection` and return the raw leaf value.
pub(crate) async fn execute_value(
    session: &Session,
    selection: &Selection,
    timeout: Option<Duration>,
) -> Result<serde_json::Value> {
    // Observing the session state first: once closed, nothing touches the
    // wire.
    let transport = session.transport()?;

    let chain = resolve_chain(session, selection, timeout).await?;
    let (query, path) = build_document(&chain);
    log::debug!("executing query: {}", query);

    let deadline = timeout.or_else(|| session.default_timeout());
    let envelope = match deadline {
        Some(deadline) => tokio::time::timeout(deadline, transport.request(&query))
            .await
            .map_err(|_| Error::ExecuteTimeout(deadline))??,
        None => transport.request(&query).await?,
    };

    if let Some(errors) = envelope.errors {
        if !errors.is_empty() {
            let message = errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::Query(message));
        }
    }

    let data = envelope
        .data
        .ok_or_else(|| Error::Decode("Response envelope carries no data".to_string()))?;
    walk_path(data, &path)
}

/// Render every node of the chain, resolving handle-valued arguments to IDs
/// with their own round trips first (in argument order).
async fn resolve_chain(
    session: &Session,
    selection: &Selection,
    timeout: Option<Duration>,
) -> Result<Vec<RenderedField>> {
    let mut chain = Vec::new();
    for node in selection.nodes() {
        let mut args = Vec::with_capacity(node.args().len());
        for (name, arg) in node.args() {
            let rendered = match arg {
                Arg::Value(value) => value.render(),
                Arg::Handle(handle) => render_id(resolve_id(session, handle, timeout).await?),
                Arg::HandleList(handles) => {
                    let mut ids = Vec::with_capacity(handles.len());
                    for handle in handles {
                        ids.push(render_id(resolve_id(session, handle, timeout).await?));
                    }
                    format!("[{}]", ids.join(", "))
                }
            };
            args.push((name.clone(), rendered));
        }
        chain.push(RenderedField {
            name: node.field().to_string(),
            args,
        });
    }
    Ok(chain)
}

/// Resolve a handle argument to its engine ID by executing its chain with an
/// `id` leaf appended.
fn resolve_id<'a>(
    session: &'a Session,
    handle: &'a Selection,
    timeout: Option<Duration>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<String>> + Send + 'a>> {
    // Boxed for recursion: the handle's own arguments may contain handles.
    Box::pin(async move { execute::<String>(session, &handle.select("id"), timeout).await })
}

fn render_id(id: String) -> String {
    serde_json::Value::String(id).to_string()
}

/// Walk the nested response payload along the return path.
fn walk_path(data: serde_json::Value, path: &[String]) -> Result<serde_json::Value> {
    let mut value = data;
    for field in path {
        value = match value {
            serde_json::Value::Object(mut map) => map.remove(field).ok_or_else(|| {
                Error::Decode(format!("Response payload is missing field {:?}", field))
            })?,
            other => {
                return Err(Error::Decode(format!(
                    "Expected an object at field {:?}, got {}",
                    field, other
                )))
            }
        };
    }
    Ok(value)
}
