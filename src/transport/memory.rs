//! `MemoryTransport` — an in-process document store implementing the full
//! [`Transport`](super::Transport) contract, including change subscriptions.
//!
//! Serves two purposes: a deterministic backend for tests (it can count open
//! subscriptions and inject stream errors), and a working store for callers
//! that run without a remote backend.
//!
//! # Locking
//!
//! Two independent locks: `docs` (document data) and `subs` (subscription
//! registry). Neither is ever held while a callback runs, so callbacks may
//! freely re-enter the transport.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use crate::error::TransportError;
use crate::query::filter::matches_all;
use crate::types::{Condition, Snapshot};

use super::{DocCallback, ErrorCallback, QueryCallback, Subscription, Transport};

// ============================================================================
// Subscription registry
// ============================================================================

struct DocSub {
    id: u64,
    collection: String,
    doc_id: String,
    on_change: DocCallback,
    on_error: ErrorCallback,
}

struct QuerySub {
    id: u64,
    collection: String,
    conditions: Vec<Condition>,
    on_change: QueryCallback,
    on_error: ErrorCallback,
}

#[derive(Default)]
struct SubState {
    next_id: u64,
    doc_subs: Vec<Arc<DocSub>>,
    query_subs: Vec<Arc<QuerySub>>,
}

impl SubState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// In-memory document store with push-based change notification.
///
/// Documents are kept per collection in a `BTreeMap`, so the store-defined
/// order of `read_many` results is document-id order.
#[derive(Default)]
pub struct MemoryTransport {
    docs: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    subs: Arc<Mutex<SubState>>,
    /// Total subscriptions ever opened — observability for multiplexer tests.
    opened: AtomicU64,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently open subscriptions (doc + query).
    pub fn active_subscription_count(&self) -> usize {
        let st = self.subs.lock();
        st.doc_subs.len() + st.query_subs.len()
    }

    /// Total subscriptions opened over the transport's lifetime.
    pub fn total_subscriptions_opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    /// Deliver a stream error to every open subscription on `collection`.
    /// Test hook for exercising `on_error` paths.
    pub fn inject_error(&self, collection: &str, error: TransportError) {
        let (doc_subs, query_subs) = self.snapshot_subs(collection);
        for sub in doc_subs {
            (sub.on_error)(error.clone());
        }
        for sub in query_subs {
            (sub.on_error)(error.clone());
        }
    }

    // -----------------------------------------------------------------------
    // Internal reads
    // -----------------------------------------------------------------------

    fn get_doc(&self, collection: &str, id: &str) -> Option<Value> {
        self.docs.lock().get(collection)?.get(id).cloned()
    }

    fn run_query(&self, collection: &str, conditions: &[Condition]) -> Vec<Snapshot> {
        let docs = self.docs.lock();
        let Some(coll) = docs.get(collection) else {
            return Vec::new();
        };
        coll.iter()
            .filter(|(_, data)| matches_all(data, conditions))
            .map(|(id, data)| Snapshot::new(id.clone(), data.clone()))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Notification
    // -----------------------------------------------------------------------

    /// Arc-snapshot the subscriptions touching `collection` (locks released
    /// before any callback fires).
    fn snapshot_subs(&self, collection: &str) -> (Vec<Arc<DocSub>>, Vec<Arc<QuerySub>>) {
        let st = self.subs.lock();
        let doc_subs = st
            .doc_subs
            .iter()
            .filter(|s| s.collection == collection)
            .cloned()
            .collect();
        let query_subs = st
            .query_subs
            .iter()
            .filter(|s| s.collection == collection)
            .cloned()
            .collect();
        (doc_subs, query_subs)
    }

    /// Re-deliver current results to every subscription affected by a change
    /// to `collection/id`. Query subscriptions on the collection are
    /// conservatively re-evaluated regardless of whether the changed
    /// document matches their conditions.
    fn notify(&self, collection: &str, id: &str) {
        let (doc_subs, query_subs) = self.snapshot_subs(collection);

        for sub in doc_subs {
            if sub.doc_id != id {
                continue;
            }
            let current = self.get_doc(collection, id);
            (sub.on_change)(current);
        }

        for sub in query_subs {
            let result = self.run_query(collection, &sub.conditions);
            (sub.on_change)(result);
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn read_one(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Value>, TransportError> {
        Ok(self.get_doc(collection, id))
    }

    async fn read_many(
        &self,
        collection: &str,
        conditions: &[Condition],
    ) -> Result<Vec<Snapshot>, TransportError> {
        Ok(self.run_query(collection, conditions))
    }

    async fn write_merge(
        &self,
        collection: &str,
        id: &str,
        payload: Value,
    ) -> Result<(), TransportError> {
        {
            let mut docs = self.docs.lock();
            let coll = docs.entry(collection.to_string()).or_default();
            match (coll.get_mut(id), payload.as_object()) {
                (Some(existing), Some(fields)) if existing.is_object() => {
                    let target = existing.as_object_mut().unwrap();
                    for (k, v) in fields {
                        target.insert(k.clone(), v.clone());
                    }
                }
                _ => {
                    coll.insert(id.to_string(), payload);
                }
            }
        }
        trace!(collection, id, "merge write");
        self.notify(collection, id);
        Ok(())
    }

    async fn write_patch(
        &self,
        collection: &str,
        id: &str,
        payload: Value,
        partial: bool,
    ) -> Result<(), TransportError> {
        {
            let mut docs = self.docs.lock();
            let coll = docs.entry(collection.to_string()).or_default();
            if partial {
                let existing = coll.get_mut(id).ok_or_else(|| {
                    TransportError::Backend(format!(
                        "cannot update missing document {collection}/{id}"
                    ))
                })?;
                match (existing.as_object_mut(), payload.as_object()) {
                    (Some(target), Some(fields)) => {
                        for (k, v) in fields {
                            target.insert(k.clone(), v.clone());
                        }
                    }
                    _ => *existing = payload,
                }
            } else {
                coll.insert(id.to_string(), payload);
            }
        }
        trace!(collection, id, partial, "patch write");
        self.notify(collection, id);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), TransportError> {
        let removed = {
            let mut docs = self.docs.lock();
            docs.get_mut(collection)
                .map(|coll| coll.remove(id).is_some())
                .unwrap_or(false)
        };
        if removed {
            trace!(collection, id, "delete");
            self.notify(collection, id);
        }
        Ok(())
    }

    fn subscribe_one(
        &self,
        collection: &str,
        id: &str,
        on_change: DocCallback,
        on_error: ErrorCallback,
    ) -> Subscription {
        let sub_id;
        {
            let mut st = self.subs.lock();
            sub_id = st.next_id();
            st.doc_subs.push(Arc::new(DocSub {
                id: sub_id,
                collection: collection.to_string(),
                doc_id: id.to_string(),
                on_change: Arc::clone(&on_change),
                on_error,
            }));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);

        // Initial delivery, outside all locks.
        let current = self.get_doc(collection, id);
        on_change(current);

        let subs = Arc::clone(&self.subs);
        Subscription::new(move || {
            subs.lock().doc_subs.retain(|s| s.id != sub_id);
        })
    }

    fn subscribe_many(
        &self,
        collection: &str,
        conditions: &[Condition],
        on_change: QueryCallback,
        on_error: ErrorCallback,
    ) -> Subscription {
        let sub_id;
        {
            let mut st = self.subs.lock();
            sub_id = st.next_id();
            st.query_subs.push(Arc::new(QuerySub {
                id: sub_id,
                collection: collection.to_string(),
                conditions: conditions.to_vec(),
                on_change: Arc::clone(&on_change),
                on_error,
            }));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);

        // Initial delivery, outside all locks.
        let result = self.run_query(collection, conditions);
        on_change(result);

        let subs = Arc::clone(&self.subs);
        Subscription::new(move || {
            subs.lock().query_subs.retain(|s| s.id != sub_id);
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
