//! Shared type definitions: document identity, raw snapshots, filter
//! conditions, and the reactive query state triple.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelError;

// ============================================================================
// Document identity
// ============================================================================

/// Identity of one document: collection path plus document id.
///
/// Set once at construction and never reassigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocRef {
    pub collection: String,
    pub id: String,
}

impl DocRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// `"collection/id"` — used in error messages and subscription keys.
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

impl std::fmt::Display for DocRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

// ============================================================================
// Raw snapshot
// ============================================================================

/// An untyped document snapshot as delivered by the transport.
///
/// Callers never see these — the owning `Model`'s converter turns them into
/// typed `Item`s before exposure.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub data: Value,
}

impl Snapshot {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

// ============================================================================
// Filter conditions
// ============================================================================

/// Comparison operator for a filter condition.
///
/// Evaluation semantics are store-defined; the bundled in-memory transport
/// implements them in `query::filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    ArrayContains,
}

/// A single `(field, operator, value)` filter triple.
///
/// Conditions on a query are conjunctively combined, in caller-given order.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }
}

/// Build a filter condition. `where_("done", FilterOp::Eq, json!(false))`.
pub fn where_(field: impl Into<String>, op: FilterOp, value: Value) -> Condition {
    Condition::new(field, op, value)
}

// ============================================================================
// Reactive query state
// ============================================================================

/// The `{data, error, loading}` triple exposed to query observers.
///
/// Replaced wholesale on every update, never mutated field-by-field, so
/// observers can treat each emission as immutable. While a refresh is in
/// flight (`loading == true`) the previous `data`/`error` are preserved so
/// consumers can keep showing stale content. Once `loading` is false,
/// exactly one of `data`/`error` is set.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub error: Option<ModelError>,
    pub loading: bool,
}

impl<T> QueryState<T> {
    /// The initial state: nothing requested yet, nothing settled.
    pub fn idle() -> Self {
        Self {
            data: None,
            error: None,
            loading: true,
        }
    }

    /// True once a result or error has been committed.
    pub fn is_settled(&self) -> bool {
        !self.loading
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

// ============================================================================
// Tests
// ============================================================================
