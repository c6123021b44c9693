//! Transport seam: the capability contract the remote document store must
//! provide, plus the `Store` handle the access layer is built around.
//!
//! The transport is an external collaborator. This crate ships one bundled
//! implementation ([`memory::MemoryTransport`]) for tests and offline use;
//! real deployments implement [`Transport`] over their network client.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{ModelError, Result, TransportError};
use crate::types::{Condition, Snapshot};

// ============================================================================
// Subscription handle
// ============================================================================

/// Handle to an open change subscription.
///
/// `unsubscribe()` is idempotent and safe to call any number of times; the
/// teardown closure runs at most once. Dropping the handle does NOT
/// unsubscribe — teardown is always explicit.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    /// Wrap a one-shot teardown closure.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// A subscription with nothing to tear down (unavailable store, or an
    /// already-closed stream).
    pub fn noop() -> Self {
        Self {
            cancel: Mutex::new(None),
        }
    }

    /// Tear the subscription down. Subsequent calls are no-ops.
    pub fn unsubscribe(&self) {
        let cancel = self.cancel.lock().take();
        if let Some(f) = cancel {
            f();
        }
    }

    /// False once `unsubscribe` has run (or for a `noop` handle).
    pub fn is_active(&self) -> bool {
        self.cancel.lock().is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

// ============================================================================
// Callback aliases
// ============================================================================

/// Change callback for a single-document subscription. Receives the payload,
/// or `None` when the document does not exist.
pub type DocCallback = Arc<dyn Fn(Option<Value>) + Send + Sync>;

/// Change callback for a collection subscription. Receives a fresh ordered
/// snapshot sequence on every change.
pub type QueryCallback = Arc<dyn Fn(Vec<Snapshot>) + Send + Sync>;

/// Stream-failure callback for subscriptions.
pub type ErrorCallback = Arc<dyn Fn(TransportError) + Send + Sync>;

// ============================================================================
// Transport trait
// ============================================================================

/// Raw document-store I/O with no typing or model semantics.
///
/// Subscriptions must deliver the current result immediately on registration
/// and once per subsequent change, until the returned [`Subscription`] is
/// torn down. One-shot reads report a missing document as `Ok(None)`, not as
/// an error.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch one document by identity.
    async fn read_one(
        &self,
        collection: &str,
        id: &str,
    ) -> std::result::Result<Option<Value>, TransportError>;

    /// Fetch all documents in `collection` matching `conditions`, in
    /// store-defined order.
    async fn read_many(
        &self,
        collection: &str,
        conditions: &[Condition],
    ) -> std::result::Result<Vec<Snapshot>, TransportError>;

    /// Write `payload`, merging with any existing document: fields absent
    /// from `payload` are left untouched.
    async fn write_merge(
        &self,
        collection: &str,
        id: &str,
        payload: Value,
    ) -> std::result::Result<(), TransportError>;

    /// Write `payload` to an existing document. With `partial == true` only
    /// the named fields are updated; with `partial == false` the document is
    /// replaced outright (created if absent).
    async fn write_patch(
        &self,
        collection: &str,
        id: &str,
        payload: Value,
        partial: bool,
    ) -> std::result::Result<(), TransportError>;

    /// Delete one document. Deleting a document that does not exist is not
    /// an error.
    async fn delete(&self, collection: &str, id: &str)
        -> std::result::Result<(), TransportError>;

    /// Open a continuous subscription on one document.
    fn subscribe_one(
        &self,
        collection: &str,
        id: &str,
        on_change: DocCallback,
        on_error: ErrorCallback,
    ) -> Subscription;

    /// Open a continuous subscription on a filtered collection.
    fn subscribe_many(
        &self,
        collection: &str,
        conditions: &[Condition],
        on_change: QueryCallback,
        on_error: ErrorCallback,
    ) -> Subscription;
}

// ============================================================================
// Store handle
// ============================================================================

/// Cheap-clone handle to the (possibly absent) transport.
///
/// A disconnected store is a first-class state: queries against it no-op
/// (empty results, never-firing subscriptions) while mutations fail with
/// `InvalidState`, so call sites need no availability special-casing.
#[derive(Clone)]
pub struct Store {
    transport: Option<Arc<dyn Transport>>,
}

impl Store {
    /// A store backed by `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport: Some(transport),
        }
    }

    /// A store with no transport configured.
    pub fn disconnected() -> Self {
        Self { transport: None }
    }

    pub fn is_available(&self) -> bool {
        self.transport.is_some()
    }

    /// The transport, if configured.
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.clone()
    }

    /// The transport, or `InvalidState` when the store is disconnected.
    /// Mutation paths use this; query paths no-op instead.
    pub(crate) fn require(&self) -> Result<Arc<dyn Transport>> {
        self.transport
            .clone()
            .ok_or_else(|| ModelError::invalid_state("store is not available"))
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("available", &self.is_available())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
