//! Shared-subscription multiplexer: many independent observers of the same
//! logical query share one underlying dispatch/subscription.
//!
//! The first observer activates the query; later observers attach to the
//! same state stream (receiving the current state immediately) without
//! opening another store subscription. The underlying subscription is torn
//! down only when the last observer detaches, and a later first observer
//! re-activates it.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::dispatch::{QueryHandle, StateCallback};
use crate::query::QueryRun;
use crate::transport::Subscription;
use crate::types::QueryState;

/// One shared call site for a fixed logical query.
pub struct SharedQuery<Q: QueryRun + Clone> {
    handle: QueryHandle<Q>,
    query: Q,
    watch: bool,
    observers: Arc<Mutex<usize>>,
}

impl<Q: QueryRun + Clone> SharedQuery<Q> {
    /// Wrap `query`. `watch` selects a continuous subscription over a
    /// one-shot fetch on activation.
    pub fn new(query: Q, watch: bool) -> Self {
        Self {
            handle: QueryHandle::new(),
            query,
            watch,
            observers: Arc::new(Mutex::new(0)),
        }
    }

    /// Snapshot of the current shared state.
    pub fn state(&self) -> QueryState<Q::Output> {
        self.handle.state()
    }

    /// Number of currently attached observers.
    pub fn observer_count(&self) -> usize {
        *self.observers.lock()
    }

    /// Attach an observer.
    ///
    /// The first observer triggers the underlying dispatch; every observer
    /// receives each state emission. Detaching (via the returned handle's
    /// `unsubscribe`) is ref-counted: the underlying query is cancelled when
    /// the count reaches zero.
    pub fn subscribe(&self, callback: StateCallback<Q::Output>) -> Subscription {
        let inner = self.handle.observe(Arc::clone(&callback));

        let is_first = {
            let mut count = self.observers.lock();
            *count += 1;
            *count == 1
        };

        if is_first {
            debug!(watch = self.watch, "first observer, activating shared query");
            self.handle.dispatch(self.query.clone(), self.watch);
        } else {
            // Late joiner: deliver the current state immediately so it does
            // not wait for the next change.
            let snapshot = self.handle.state();
            callback(&snapshot);
        }

        let observers = Arc::clone(&self.observers);
        let handle = self.handle.clone();
        Subscription::new(move || {
            inner.unsubscribe();
            let is_last = {
                let mut count = observers.lock();
                *count -= 1;
                *count == 0
            };
            if is_last {
                debug!("last observer detached, tearing down shared query");
                handle.cancel();
            }
        })
    }
}
