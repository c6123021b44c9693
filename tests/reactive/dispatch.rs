//! Dispatch controller tests: ticket-based dedup under reordered
//! completions, loading-state preservation, subscription teardown on
//! re-dispatch, and cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use remote_docs::query::{DataCallback, FailureCallback, QueryRun};
use remote_docs::transport::memory::MemoryTransport;
use remote_docs::{
    where_, FilterOp, Model, ModelError, QueryHandle, Store, Subscription, Transport,
    TransportError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Notify;

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Task {
    title: String,
    done: bool,
}

fn make_store() -> (Store, Arc<MemoryTransport>) {
    let transport = Arc::new(MemoryTransport::new());
    (Store::new(Arc::clone(&transport) as _), transport)
}

/// Poll until `cond` holds (one-shot dispatches settle on a spawned task).
async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within timeout");
}

/// A one-shot query whose completion is held back until released, so tests
/// can reorder response arrival at will.
#[derive(Clone)]
struct GatedQuery {
    tag: u32,
    gate: Arc<Notify>,
    calls: Arc<AtomicUsize>,
}

impl GatedQuery {
    fn new(tag: u32) -> Self {
        Self {
            tag,
            gate: Arc::new(Notify::new()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl QueryRun for GatedQuery {
    type Output = u32;

    async fn get(&self) -> remote_docs::Result<u32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(self.tag)
    }

    fn watch(&self, _on_data: DataCallback<u32>, _on_error: FailureCallback) -> Subscription {
        Subscription::noop()
    }
}

/// A one-shot query that always fails.
#[derive(Clone)]
struct FailingQuery;

#[async_trait]
impl QueryRun for FailingQuery {
    type Output = u32;

    async fn get(&self) -> remote_docs::Result<u32> {
        Err(ModelError::Transport(TransportError::Network(
            "wire cut".into(),
        )))
    }

    fn watch(&self, _on_data: DataCallback<u32>, _on_error: FailureCallback) -> Subscription {
        Subscription::noop()
    }
}

// ============================================================================
// One-shot commits
// ============================================================================

#[tokio::test]
async fn one_shot_dispatch_settles_into_state() {
    let handle: QueryHandle<GatedQuery> = QueryHandle::new();
    let query = GatedQuery::new(7);

    handle.dispatch(query.clone(), false);
    assert!(handle.state().loading);

    query.release();
    wait_until(|| handle.state().is_settled()).await;

    let state = handle.state();
    assert_eq!(state.data, Some(7));
    assert!(state.error.is_none());
}

#[tokio::test]
async fn only_the_latest_request_may_commit_even_when_responses_reorder() {
    let handle: QueryHandle<GatedQuery> = QueryHandle::new();
    let q1 = GatedQuery::new(1);
    let q2 = GatedQuery::new(2);
    let q3 = GatedQuery::new(3);

    handle.dispatch(q1.clone(), false);
    handle.dispatch(q2.clone(), false);
    handle.dispatch(q3.clone(), false);

    // Arrival order 3, 1, 2 — only 3 may ever be observed.
    q3.release();
    wait_until(|| handle.state().is_settled()).await;
    assert_eq!(handle.state().data, Some(3));

    q1.release();
    q2.release();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.state().data, Some(3), "stale response committed");
}

#[tokio::test]
async fn emissions_are_observable_and_stale_results_never_emit() {
    let handle: QueryHandle<GatedQuery> = QueryHandle::new();
    let seen: Arc<parking_lot::Mutex<Vec<Option<u32>>>> =
        Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen_cb = Arc::clone(&seen);
    let _obs = handle.observe(Arc::new(move |st| seen_cb.lock().push(st.data.clone())));

    let q1 = GatedQuery::new(1);
    let q2 = GatedQuery::new(2);
    handle.dispatch(q1.clone(), false);
    handle.dispatch(q2.clone(), false);

    q2.release();
    wait_until(|| handle.state().is_settled()).await;
    q1.release();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let log = seen.lock();
    // Two loading emissions plus exactly one data commit.
    assert_eq!(log.len(), 3);
    assert_eq!(log[2], Some(2));
}

// ============================================================================
// Loading preservation and error commits
// ============================================================================

#[tokio::test]
async fn refresh_preserves_previous_data_while_loading() {
    let handle: QueryHandle<GatedQuery> = QueryHandle::new();

    let q1 = GatedQuery::new(1);
    handle.dispatch(q1.clone(), false);
    q1.release();
    wait_until(|| handle.state().is_settled()).await;

    let q2 = GatedQuery::new(2);
    handle.dispatch(q2.clone(), false);

    let state = handle.state();
    assert!(state.loading);
    assert_eq!(state.data, Some(1), "stale data must stay visible");

    q2.release();
    wait_until(|| handle.state().data == Some(2)).await;
}

#[tokio::test]
async fn committed_error_clears_data_and_settles() {
    let handle: QueryHandle<FailingQuery> = QueryHandle::new();
    handle.dispatch(FailingQuery, false);

    wait_until(|| handle.state().is_settled()).await;
    let state = handle.state();
    assert!(state.data.is_none());
    assert!(matches!(state.error, Some(ModelError::Transport(_))));
}

// ============================================================================
// Watched dispatch
// ============================================================================

#[tokio::test]
async fn watched_dispatch_streams_state_updates() {
    let (store, transport) = make_store();
    let model: Model<Task> = Model::new(store, "tasks");

    let handle = QueryHandle::new();
    handle.dispatch(model.filter([where_("done", FilterOp::Eq, json!(false))]), true);

    // Initial delivery is synchronous through the memory transport.
    let state = handle.state();
    assert!(state.is_settled());
    assert_eq!(state.data.as_ref().map(Vec::len), Some(0));

    transport
        .write_merge("tasks", "a", json!({ "done": false }))
        .await
        .unwrap();
    assert_eq!(handle.state().data.as_ref().map(Vec::len), Some(1));
}

#[tokio::test]
async fn redispatch_tears_down_the_previous_subscription() {
    let (store, transport) = make_store();
    let model: Model<Task> = Model::new(store, "tasks");

    let handle = QueryHandle::new();
    handle.dispatch(model.filter([where_("done", FilterOp::Eq, json!(false))]), true);
    handle.dispatch(model.filter([where_("done", FilterOp::Eq, json!(true))]), true);

    assert_eq!(transport.total_subscriptions_opened(), 2);
    assert_eq!(
        transport.active_subscription_count(),
        1,
        "previous subscription leaked"
    );
}

#[tokio::test]
async fn cancel_discards_in_flight_results_and_closes_streams() {
    let (store, transport) = make_store();
    let model: Model<Task> = Model::new(store, "tasks");

    let handle = QueryHandle::new();
    handle.dispatch(model.all(), true);
    assert_eq!(transport.active_subscription_count(), 1);

    handle.cancel();
    assert_eq!(transport.active_subscription_count(), 0);

    // Post-cancel store changes must not reach the state.
    let before = handle.state();
    transport
        .write_merge("tasks", "a", json!({ "done": false }))
        .await
        .unwrap();
    assert_eq!(
        handle.state().data.as_ref().map(Vec::len),
        before.data.as_ref().map(Vec::len)
    );
}

// ============================================================================
// Keyed dispatch
// ============================================================================

#[tokio::test]
async fn dispatch_keyed_skips_unchanged_inputs() {
    let handle: QueryHandle<GatedQuery> = QueryHandle::new();
    let query = GatedQuery::new(1);
    let calls = Arc::clone(&query.calls);

    let q = query.clone();
    handle.dispatch_keyed(("tasks", 1u32), move || q, false);
    let q = query.clone();
    handle.dispatch_keyed(("tasks", 1u32), move || q, false);

    query.release();
    wait_until(|| handle.state().is_settled()).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1, "same key re-dispatched");

    // A changed key dispatches again.
    let q = query.clone();
    handle.dispatch_keyed(("tasks", 2u32), move || q, false);
    query.release();
    wait_until(|| calls.load(Ordering::SeqCst) == 2).await;
}
