//! `EventEmitter<T>` — typed synchronous broadcast primitive.
//!
//! Backs both the dispatch controller's state stream and the shared-query
//! multiplexer. All methods take `&self`; the internal `parking_lot::Mutex`
//! is never held while a listener runs, so listeners may register or remove
//! listeners (including themselves) from inside a callback.
//!
//! Emission snapshots the listener list first: a listener removed during an
//! emission round is still called in that round, and one added during the
//! round is not called until the next.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Identifies a registered listener for removal via [`EventEmitter::off`].
pub type ListenerId = u64;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct EventEmitter<T> {
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
    next_id: AtomicU64,
}

impl<T> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `listener`; it receives a shared reference to every
    /// subsequently emitted value.
    pub fn on(&self, listener: Arc<dyn Fn(&T) + Send + Sync>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));
        id
    }

    /// Remove the listener registered under `id`. Unknown ids are ignored,
    /// so removal is safe to repeat.
    pub fn off(&self, id: ListenerId) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }

    /// Deliver `value` to every currently registered listener.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = {
            let guard = self.listeners.lock();
            guard.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in snapshot {
            listener(value);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}
