//! Dispatch controller: runs a query (one-shot or watched) behind a
//! reactive `{data, error, loading}` state object, and guarantees that only
//! the most recently dispatched request can ever commit to that state.
//!
//! Each dispatch takes the next ticket from a monotonically increasing
//! counter; a result callback captures its ticket and re-checks it against
//! the counter under the state lock at commit time. A stale callback is a
//! guaranteed no-op, so visible-state updates are totally ordered by ticket
//! even when responses arrive out of order or from worker threads.

pub mod emitter;

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::ModelError;
use crate::query::QueryRun;
use crate::transport::Subscription;
use crate::types::QueryState;

use emitter::EventEmitter;

/// Observer callback receiving each state emission.
pub type StateCallback<R> = Arc<dyn Fn(&QueryState<R>) + Send + Sync>;

// ============================================================================
// QueryHandle
// ============================================================================

/// One reactive call site for queries of type `Q`.
///
/// Cloning yields another handle to the same state, ticket counter, and
/// observer list.
pub struct QueryHandle<Q: QueryRun> {
    ticket: Arc<AtomicU64>,
    state: Arc<Mutex<QueryState<Q::Output>>>,
    active: Arc<Mutex<Option<Subscription>>>,
    emitter: Arc<EventEmitter<QueryState<Q::Output>>>,
    /// Last dependency key seen by `dispatch_keyed`.
    last_key: Arc<Mutex<Option<(u64, bool)>>>,
}

impl<Q: QueryRun> Clone for QueryHandle<Q> {
    fn clone(&self) -> Self {
        Self {
            ticket: Arc::clone(&self.ticket),
            state: Arc::clone(&self.state),
            active: Arc::clone(&self.active),
            emitter: Arc::clone(&self.emitter),
            last_key: Arc::clone(&self.last_key),
        }
    }
}

impl<Q: QueryRun> Default for QueryHandle<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q: QueryRun> QueryHandle<Q> {
    pub fn new() -> Self {
        Self {
            ticket: Arc::new(AtomicU64::new(0)),
            state: Arc::new(Mutex::new(QueryState::idle())),
            active: Arc::new(Mutex::new(None)),
            emitter: Arc::new(EventEmitter::new()),
            last_key: Arc::new(Mutex::new(None)),
        }
    }

    /// Snapshot of the current reactive state.
    pub fn state(&self) -> QueryState<Q::Output> {
        self.state.lock().clone()
    }

    /// Register an observer for every subsequent state emission.
    pub fn observe(&self, callback: StateCallback<Q::Output>) -> Subscription {
        let id = self.emitter.on(callback);
        let emitter = Arc::clone(&self.emitter);
        Subscription::new(move || emitter.off(id))
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.emitter.len()
    }

    /// Run `query` and route its result into this handle's state.
    ///
    /// The state immediately becomes loading, preserving the previous
    /// `data`/`error` so consumers can show stale content while refreshing.
    /// Any prior subscription is torn down first. With `watch == false` the
    /// one-shot fetch runs on a spawned task (requires a tokio runtime);
    /// with `watch == true` a continuous subscription is opened and each
    /// delivery commits through the same ticket gate.
    pub fn dispatch(&self, query: Q, watch: bool) {
        let generation = self.ticket.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, watch, "dispatch");

        // No leaked subscriptions: tear down the prior stream before the
        // replacement is established.
        let previous = self.active.lock().take();
        if let Some(sub) = previous {
            sub.unsubscribe();
        }

        let loading = {
            let mut st = self.state.lock();
            st.loading = true;
            st.clone()
        };
        self.emitter.emit(&loading);

        let gate = CommitGate {
            ticket: Arc::clone(&self.ticket),
            state: Arc::clone(&self.state),
            emitter: Arc::clone(&self.emitter),
            generation,
        };

        if watch {
            let ok_gate = gate.clone();
            let err_gate = gate;
            let sub = query.watch(
                Arc::new(move |out| ok_gate.commit_data(out)),
                Arc::new(move |e| err_gate.commit_error(e)),
            );

            // A re-entrant dispatch may have superseded us while `watch` ran
            // its synchronous initial delivery; then the new stream already
            // owns the slot and ours must go down instead of clobbering it.
            let mut active = self.active.lock();
            if self.ticket.load(Ordering::SeqCst) == generation {
                *active = Some(sub);
            } else {
                drop(active);
                sub.unsubscribe();
            }
        } else {
            tokio::spawn(async move {
                match query.get().await {
                    Ok(out) => gate.commit_data(out),
                    Err(e) => gate.commit_error(e),
                }
            });
        }
    }

    /// Dispatch only when the dependency key (or the watch flag) differs
    /// from the previous call. `build` is not invoked otherwise.
    pub fn dispatch_keyed<K: Hash>(&self, key: K, build: impl FnOnce() -> Q, watch: bool) {
        let hashed = {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            key.hash(&mut hasher);
            hasher.finish()
        };
        {
            let mut last = self.last_key.lock();
            if *last == Some((hashed, watch)) {
                return;
            }
            *last = Some((hashed, watch));
        }
        self.dispatch(build(), watch);
    }

    /// Invalidate any in-flight request and tear down the active
    /// subscription. The settled state is left as-is.
    pub fn cancel(&self) {
        self.ticket.fetch_add(1, Ordering::SeqCst);
        let active = self.active.lock().take();
        if let Some(sub) = active {
            sub.unsubscribe();
        }
        *self.last_key.lock() = None;
    }
}

// ============================================================================
// CommitGate
// ============================================================================

/// Captured generation plus the shared state it may commit to.
///
/// The generation check runs under the state lock, so "latest ticket wins"
/// holds even when results are delivered from worker threads.
struct CommitGate<R> {
    ticket: Arc<AtomicU64>,
    state: Arc<Mutex<QueryState<R>>>,
    emitter: Arc<EventEmitter<QueryState<R>>>,
    generation: u64,
}

impl<R> Clone for CommitGate<R> {
    fn clone(&self) -> Self {
        Self {
            ticket: Arc::clone(&self.ticket),
            state: Arc::clone(&self.state),
            emitter: Arc::clone(&self.emitter),
            generation: self.generation,
        }
    }
}

impl<R: Clone> CommitGate<R> {
    fn commit(&self, next: QueryState<R>) {
        let snapshot = {
            let mut st = self.state.lock();
            if self.ticket.load(Ordering::SeqCst) != self.generation {
                trace!(generation = self.generation, "discarding stale result");
                return;
            }
            *st = next;
            st.clone()
        };
        self.emitter.emit(&snapshot);
    }

    fn commit_data(&self, data: R) {
        self.commit(QueryState {
            data: Some(data),
            error: None,
            loading: false,
        });
    }

    fn commit_error(&self, error: ModelError) {
        self.commit(QueryState {
            data: None,
            error: Some(error),
            loading: false,
        });
    }
}
