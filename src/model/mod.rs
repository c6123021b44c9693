//! `Model<T>` — factory and query-builder for one document kind, plus the
//! registry that replaces process-global model lookup with explicit
//! dependency injection.

mod item;

pub use item::Item;

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::query::{DocumentQuery, MultiQuery};
use crate::transport::Store;
use crate::types::{Condition, DocRef, Snapshot};

// ============================================================================
// Entity
// ============================================================================

/// Payload contract for a document kind.
///
/// Blanket-implemented: any serde-round-trippable, cloneable type with a
/// `Default` (the model's "empty" payload) qualifies.
pub trait Entity:
    Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
}

impl<T> Entity for T where
    T: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
}

// ============================================================================
// Conversion contract
// ============================================================================

/// Shallow-merge `patch`'s top-level fields into `target` (both JSON
/// objects). Non-object inputs replace `target` outright.
pub(crate) fn shallow_merge(target: &mut Value, patch: &Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(t), Some(p)) => {
            for (k, v) in p {
                t.insert(k.clone(), v.clone());
            }
        }
        _ => *target = patch.clone(),
    }
}

/// Decode raw snapshot data into `T` by merging it over the model's empty
/// payload first, so documents missing optional fields still deserialize.
/// Callers never see untyped payloads — every read goes through here.
pub(crate) fn decode<T: DeserializeOwned>(base: &Value, data: Value) -> Result<T> {
    let mut merged = base.clone();
    shallow_merge(&mut merged, &data);
    Ok(serde_json::from_value(merged)?)
}

// ============================================================================
// Model
// ============================================================================

static NAME_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn name_regex() -> &'static regex::Regex {
    NAME_REGEX.get_or_init(|| {
        regex::Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("name regex is valid")
    })
}

/// Factory and query-builder for one document kind.
///
/// One `Model` per collection, constructed at startup (usually through a
/// [`ModelRegistry`]) and shared for the life of the process.
pub struct Model<T: Entity> {
    collection: String,
    store: Store,
    empty: T,
    /// `empty` serialized once — the converter merge base.
    base: Arc<Value>,
}

impl<T: Entity> Model<T> {
    /// Create a model whose empty payload is `T::default()`.
    ///
    /// Panics if `collection` is not identifier-shaped — model construction
    /// is startup wiring, and a bad collection name is a programming error.
    pub fn new(store: Store, collection: impl Into<String>) -> Self {
        Self::with_empty(store, collection, T::default())
    }

    /// Create a model with an explicit empty payload, used for local
    /// creation and as the merge base for partially-populated documents.
    pub fn with_empty(store: Store, collection: impl Into<String>, empty: T) -> Self {
        let collection = collection.into();
        assert!(
            name_regex().is_match(&collection),
            "Invalid collection name: {collection:?}"
        );
        let base = serde_json::to_value(&empty)
            .unwrap_or_else(|e| panic!("empty payload for {collection:?} must serialize: {e}"));
        Self {
            collection,
            store,
            empty,
            base: Arc::new(base),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Query building
    // -----------------------------------------------------------------------

    fn request(&self, conditions: Vec<Condition>) -> MultiQuery<T> {
        MultiQuery::new(
            self.store.clone(),
            self.collection.clone(),
            conditions,
            Arc::clone(&self.base),
        )
    }

    /// Query over the whole collection.
    pub fn all(&self) -> MultiQuery<T> {
        self.request(Vec::new())
    }

    /// Query filtered by `(field, op, value)` conditions, conjunctively
    /// combined in the given order.
    pub fn filter(&self, conditions: impl IntoIterator<Item = Condition>) -> MultiQuery<T> {
        self.request(conditions.into_iter().collect())
    }

    /// A single-document query for a known identity.
    pub fn doc(&self, id: impl Into<String>) -> DocumentQuery<T> {
        DocumentQuery::new(
            self.store.clone(),
            DocRef::new(self.collection.clone(), id),
            Arc::clone(&self.base),
        )
    }

    // -----------------------------------------------------------------------
    // Item construction
    // -----------------------------------------------------------------------

    /// An unvalidated handle for a known identity. No store I/O; the item
    /// must be loaded before its payload is readable.
    pub fn item(&self, id: impl Into<String>) -> Item<T> {
        Item::new(
            DocRef::new(self.collection.clone(), id),
            self.store.clone(),
            Arc::clone(&self.base),
            self.empty.clone(),
            false,
        )
    }

    /// A new local-only item with a generated id and the empty payload.
    /// No store I/O until `save()`.
    pub fn create(&self) -> Item<T> {
        self.create_with_id(Uuid::new_v4().to_string())
    }

    /// A new local-only item under a caller-chosen id.
    pub fn create_with_id(&self, id: impl Into<String>) -> Item<T> {
        Item::new(
            DocRef::new(self.collection.clone(), id),
            self.store.clone(),
            Arc::clone(&self.base),
            self.empty.clone(),
            true,
        )
    }

    /// Load the item at `id`, or return a local, unsaved item for that
    /// identity when the store has none. Failures other than
    /// `ItemDoesNotExist` propagate.
    pub async fn get_or_create(&self, id: impl Into<String>) -> Result<Item<T>> {
        let mut item = self.create_with_id(id);
        match item.load().await {
            Ok(()) => Ok(item),
            Err(crate::error::ModelError::ItemDoesNotExist { .. }) => Ok(item),
            Err(e) => Err(e),
        }
    }

    /// Materialize a raw store snapshot as a typed, loaded item.
    pub fn from_snapshot(&self, snapshot: Snapshot) -> Result<Item<T>> {
        let data: T = decode(&self.base, snapshot.data)?;
        Ok(Item::from_store(
            DocRef::new(self.collection.clone(), snapshot.id),
            self.store.clone(),
            Arc::clone(&self.base),
            data,
        ))
    }
}

// ============================================================================
// ModelRegistry
// ============================================================================

/// Explicit model registry: constructed once at startup around a [`Store`]
/// and passed to consumers; never torn down mid-process.
pub struct ModelRegistry {
    store: Store,
    models: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl ModelRegistry {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            models: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Get or create the model for `collection`.
    ///
    /// Panics if `collection` was previously registered with a different
    /// entity type — one collection, one payload type, fixed at startup.
    pub fn register<T: Entity>(&self, collection: &str) -> Arc<Model<T>> {
        if let Some(existing) = self.get::<T>(collection) {
            return existing;
        }
        let mut models = self.models.write();
        // Re-check under the write lock.
        if let Some(entry) = models.get(collection) {
            return Arc::clone(entry)
                .downcast::<Model<T>>()
                .unwrap_or_else(|_| {
                    panic!("collection {collection:?} already registered with a different entity type")
                });
        }
        let model = Arc::new(Model::<T>::new(self.store.clone(), collection));
        models.insert(collection.to_string(), Arc::clone(&model) as Arc<dyn Any + Send + Sync>);
        model
    }

    /// Look up a registered model, or `None` if the collection is unknown
    /// or registered under a different entity type.
    pub fn get<T: Entity>(&self, collection: &str) -> Option<Arc<Model<T>>> {
        let models = self.models.read();
        let entry = models.get(collection)?;
        Arc::clone(entry).downcast::<Model<T>>().ok()
    }
}

// ============================================================================
// Tests
// ============================================================================
