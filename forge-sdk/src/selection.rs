//! Immutable selection chains and the query document serializer
//!
//! A [`Selection`] is one field access (with its arguments) linked to its
//! parent, so a whole chain is a persistent singly-linked list sharing
//! structure through `Arc`. Chaining methods on the typed API allocate a new
//! node and leave every existing node untouched, which is what makes handle
//! branching safe: two handles forked from the same base can never observe
//! each other's additions.
//!
//! Serialization walks the chain root-to-leaf and emits the nested field
//! document the engine expects, plus the ordered field path used to pull the
//! final value out of the nested response payload.

use std::sync::Arc;

/// A literal argument value, rendered into the query document.
///
/// Enum values are emitted bare (unquoted); everything else follows JSON
/// literal syntax, which the wire protocol shares.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GqlValue {
    String(String),
    Int(i64),
    Boolean(bool),
    Enum(String),
    List(Vec<GqlValue>),
    Object(Vec<(String, GqlValue)>),
}

impl GqlValue {
    /// Render this value as a query-document literal.
    pub(crate) fn render(&self) -> String {
        match self {
            GqlValue::String(s) => {
                // JSON string escaping matches the wire protocol's rules.
                serde_json::Value::String(s.clone()).to_string()
            }
            GqlValue::Int(n) => n.to_string(),
            GqlValue::Boolean(b) => b.to_string(),
            GqlValue::Enum(name) => name.clone(),
            GqlValue::List(items) => {
                let inner: Vec<String> = items.iter().map(|v| v.render()).collect();
                format!("[{}]", inner.join(", "))
            }
            GqlValue::Object(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.render()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
        }
    }
}

/// One argument attached to a selection node.
///
/// Handle-valued arguments stay lazy until execution: building a chain never
/// does I/O, so a handle passed as an argument is carried as its own
/// selection chain and resolved to an engine ID right before the enclosing
/// query is sent.
#[derive(Debug, Clone)]
pub(crate) enum Arg {
    Value(GqlValue),
    Handle(Selection),
    HandleList(Vec<Selection>),
}

#[derive(Debug)]
struct SelectionInner {
    parent: Option<Selection>,
    field: String,
    args: Vec<(String, Arg)>,
}

/// One field+arguments step in a query chain.
///
/// Cloning is cheap (a single `Arc` bump) and appending produces a new node
/// pointing at the old chain, never mutating it.
#[derive(Debug, Clone)]
pub struct Selection {
    inner: Arc<SelectionInner>,
}

impl Selection {
    /// The empty root of every chain. Not emitted into the document.
    pub(crate) fn root() -> Self {
        Selection {
            inner: Arc::new(SelectionInner {
                parent: None,
                field: String::new(),
                args: Vec::new(),
            }),
        }
    }

    /// Append a child field with no arguments.
    pub(crate) fn select(&self, field: &str) -> Self {
        Selection {
            inner: Arc::new(SelectionInner {
                parent: Some(self.clone()),
                field: field.to_string(),
                args: Vec::new(),
            }),
        }
    }

    /// Return a copy of this node with one more literal argument.
    ///
    /// Only called on freshly appended nodes while the typed API assembles a
    /// field; the parent chain is shared, not copied.
    pub(crate) fn arg(&self, name: &str, value: GqlValue) -> Self {
        self.push_arg(name.to_string(), Arg::Value(value))
    }

    /// Attach a handle-valued argument, resolved to an ID at execution time.
    pub(crate) fn arg_handle(&self, name: &str, handle: Selection) -> Self {
        self.push_arg(name.to_string(), Arg::Handle(handle))
    }

    /// Attach a sequence of handle-valued arguments.
    pub(crate) fn arg_handles(&self, name: &str, handles: Vec<Selection>) -> Self {
        self.push_arg(name.to_string(), Arg::HandleList(handles))
    }

    fn push_arg(&self, name: String, arg: Arg) -> Self {
        let mut args = self.inner.args.clone();
        args.push((name, arg));
        Selection {
            inner: Arc::new(SelectionInner {
                parent: self.inner.parent.clone(),
                field: self.inner.field.clone(),
                args,
            }),
        }
    }

    pub(crate) fn field(&self) -> &str {
        &self.inner.field
    }

    pub(crate) fn args(&self) -> &[(String, Arg)] {
        &self.inner.args
    }

    /// All nodes from root to this leaf, excluding the empty root.
    pub(crate) fn nodes(&self) -> Vec<Selection> {
        let mut chain = Vec::new();
        let mut cursor = Some(self.clone());
        while let Some(node) = cursor {
            if !node.inner.field.is_empty() {
                chain.push(node.clone());
            }
            cursor = node.inner.parent.clone();
        }
        chain.reverse();
        chain
    }
}

/// A selection node with every argument rendered to a literal, ready to be
/// written into the document.
#[derive(Debug, Clone)]
pub(crate) struct RenderedField {
    pub(crate) name: String,
    pub(crate) args: Vec<(String, String)>,
}

/// Serialize a resolved chain into the operation document and the field path
/// used to walk the nested response.
pub(crate) fn build_document(chain: &[RenderedField]) -> (String, Vec<String>) {
    let mut query = String::from("query");
    let mut path = Vec::with_capacity(chain.len());

    for field in chain {
        query.push('{');
        query.push_str(&field.name);
        if !field.args.is_empty() {
            let rendered: Vec<String> = field
                .args
                .iter()
                .map(|(name, value)| format!("{}:{}", name, value))
                .collect();
            query.push('(');
            query.push_str(&rendered.join(","));
            query.push(')');
        }
        path.push(field.name.clone());
    }
    for _ in chain {
        query.push('}');
    }

    (query, path)
}
