//! Query executors: one-shot fetch and continuous subscription, polymorphic
//! on cardinality.
//!
//! [`MultiQuery`] runs over a filtered collection and yields ordered typed
//! `Item` sequences. [`DocumentQuery`] is identity-addressed and yields the
//! typed payload (or `None` when the document is missing — only
//! `Item::load()` upgrades that to an error).
//!
//! Both no-op safely against a disconnected store: `get()` returns
//! empty/`None` and `watch()` returns a subscription that never fires.

pub mod filter;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::model::{decode, Entity, Item};
use crate::transport::{Store, Subscription};
use crate::types::{Condition, DocRef, Snapshot};

// ============================================================================
// QueryRun — the executor contract
// ============================================================================

/// Callback receiving typed query output.
pub type DataCallback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Callback receiving query or stream failures.
pub type FailureCallback = Arc<dyn Fn(ModelError) + Send + Sync>;

/// One query executor: a one-shot `get` plus a continuous `watch`, with the
/// output type carrying the cardinality (`Vec<Item<T>>` vs. `Option<T>`).
#[async_trait]
pub trait QueryRun: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    /// Execute once. Missing data is an empty/`None` output, not an error.
    async fn get(&self) -> Result<Self::Output>;

    /// Open a continuous subscription. `on_data` fires with a fresh output
    /// on every change notification (including the initial state), `on_error`
    /// on stream failure. Tear down via the returned [`Subscription`].
    fn watch(&self, on_data: DataCallback<Self::Output>, on_error: FailureCallback)
        -> Subscription;
}

// ============================================================================
// MultiQuery
// ============================================================================

/// A filtered (or unfiltered) collection query producing typed `Item`s.
pub struct MultiQuery<T: Entity> {
    store: Store,
    collection: String,
    conditions: Vec<Condition>,
    /// Serialized empty payload — the converter's merge base.
    base: Arc<Value>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for MultiQuery<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            collection: self.collection.clone(),
            conditions: self.conditions.clone(),
            base: Arc::clone(&self.base),
            _marker: PhantomData,
        }
    }
}

impl<T: Entity> MultiQuery<T> {
    pub(crate) fn new(
        store: Store,
        collection: String,
        conditions: Vec<Condition>,
        base: Arc<Value>,
    ) -> Self {
        Self {
            store,
            collection,
            conditions,
            base,
            _marker: PhantomData,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Materialize one raw snapshot as a loaded, store-backed `Item`.
    fn to_item(&self, snapshot: Snapshot) -> Result<Item<T>> {
        let data: T = decode(&self.base, snapshot.data)?;
        Ok(Item::from_store(
            DocRef::new(self.collection.clone(), snapshot.id),
            self.store.clone(),
            Arc::clone(&self.base),
            data,
        ))
    }

    fn to_items(&self, snapshots: Vec<Snapshot>) -> Result<Vec<Item<T>>> {
        snapshots.into_iter().map(|s| self.to_item(s)).collect()
    }
}

#[async_trait]
impl<T: Entity> QueryRun for MultiQuery<T> {
    type Output = Vec<Item<T>>;

    async fn get(&self) -> Result<Vec<Item<T>>> {
        let Some(transport) = self.store.transport() else {
            return Ok(Vec::new());
        };
        let snapshots = transport
            .read_many(&self.collection, &self.conditions)
            .await?;
        self.to_items(snapshots)
    }

    fn watch(
        &self,
        on_data: DataCallback<Vec<Item<T>>>,
        on_error: FailureCallback,
    ) -> Subscription {
        let Some(transport) = self.store.transport() else {
            return Subscription::noop();
        };

        let this = self.clone();
        let convert_error = Arc::clone(&on_error);
        transport.subscribe_many(
            &self.collection,
            &self.conditions,
            Arc::new(move |snapshots| match this.to_items(snapshots) {
                Ok(items) => on_data(items),
                Err(e) => convert_error(e),
            }),
            Arc::new(move |e| on_error(ModelError::Transport(e))),
        )
    }
}

// ============================================================================
// DocumentQuery
// ============================================================================

/// An identity-addressed query over one document.
pub struct DocumentQuery<T: Entity> {
    store: Store,
    doc_ref: DocRef,
    base: Arc<Value>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for DocumentQuery<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            doc_ref: self.doc_ref.clone(),
            base: Arc::clone(&self.base),
            _marker: PhantomData,
        }
    }
}

impl<T: Entity> DocumentQuery<T> {
    pub(crate) fn new(store: Store, doc_ref: DocRef, base: Arc<Value>) -> Self {
        Self {
            store,
            doc_ref,
            base,
            _marker: PhantomData,
        }
    }

    pub fn doc_ref(&self) -> &DocRef {
        &self.doc_ref
    }
}

#[async_trait]
impl<T: Entity> QueryRun for DocumentQuery<T> {
    type Output = Option<T>;

    async fn get(&self) -> Result<Option<T>> {
        let Some(transport) = self.store.transport() else {
            return Ok(None);
        };
        let raw = transport
            .read_one(&self.doc_ref.collection, &self.doc_ref.id)
            .await?;
        match raw {
            Some(data) => Ok(Some(decode(&self.base, data)?)),
            None => Ok(None),
        }
    }

    fn watch(&self, on_data: DataCallback<Option<T>>, on_error: FailureCallback) -> Subscription {
        let Some(transport) = self.store.transport() else {
            return Subscription::noop();
        };

        let base = Arc::clone(&self.base);
        let convert_error = Arc::clone(&on_error);
        transport.subscribe_one(
            &self.doc_ref.collection,
            &self.doc_ref.id,
            Arc::new(move |raw| match raw {
                Some(data) => match decode::<T>(&base, data) {
                    Ok(payload) => on_data(Some(payload)),
                    Err(e) => convert_error(e),
                },
                None => on_data(None),
            }),
            Arc::new(move |e| on_error(ModelError::Transport(e))),
        )
    }
}
