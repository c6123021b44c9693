//! `Item<T>` — one document: identity, loaded/local-only state, and the
//! save/load/patch/delete operations.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{ModelError, Result};
use crate::query::{DocumentQuery, QueryRun};
use crate::transport::Store;
use crate::types::DocRef;

use super::{shallow_merge, Entity};

/// A typed handle to one document.
///
/// Lifecycle flags:
/// - `local_only` — created client-side and not yet confirmed in the store.
///   Transitions true→false exactly once, on first successful save or load.
/// - `valid` — the payload is readable. Set by local creation or a
///   successful load, and once true it stays true for the handle's lifetime.
///   Deletion changes neither flag (see [`Item::delete`]).
pub struct Item<T: Entity> {
    doc_ref: DocRef,
    store: Store,
    /// Converter merge base shared with the owning `Model`.
    base: Arc<Value>,
    data: T,
    local_only: bool,
    valid: bool,
}

impl<T: Entity> Clone for Item<T> {
    fn clone(&self) -> Self {
        Self {
            doc_ref: self.doc_ref.clone(),
            store: self.store.clone(),
            base: Arc::clone(&self.base),
            data: self.data.clone(),
            local_only: self.local_only,
            valid: self.valid,
        }
    }
}

impl<T: Entity> std::fmt::Debug for Item<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("doc_ref", &self.doc_ref)
            .field("local_only", &self.local_only)
            .field("valid", &self.valid)
            .finish()
    }
}

impl<T: Entity> Item<T> {
    /// Construct a handle. `is_new == true` yields a local-only, valid item
    /// (client-side creation); `false` yields an unvalidated handle that
    /// must be loaded before its payload is readable.
    pub(crate) fn new(
        doc_ref: DocRef,
        store: Store,
        base: Arc<Value>,
        data: T,
        is_new: bool,
    ) -> Self {
        Self {
            doc_ref,
            store,
            base,
            data,
            local_only: is_new,
            valid: is_new,
        }
    }

    /// Construct an item materialized from a store snapshot: confirmed
    /// store-side, payload already loaded.
    pub(crate) fn from_store(doc_ref: DocRef, store: Store, base: Arc<Value>, data: T) -> Self {
        Self {
            doc_ref,
            store,
            base,
            data,
            local_only: false,
            valid: true,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.doc_ref.id
    }

    pub fn doc_ref(&self) -> &DocRef {
        &self.doc_ref
    }

    /// True while the item has no confirmed corresponding store document.
    pub fn is_local_only(&self) -> bool {
        self.local_only
    }

    /// True once the payload is readable (after local creation or a load).
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Snapshot copy of the payload. `InvalidState` before the item is valid.
    pub fn data(&self) -> Result<T> {
        self.require_valid()?;
        Ok(self.data.clone())
    }

    /// Borrow the payload for reading. `InvalidState` before the item is valid.
    pub fn get(&self) -> Result<&T> {
        self.require_valid()?;
        Ok(&self.data)
    }

    /// Borrow the payload for in-place assignment. Changes are local until
    /// [`save`](Self::save) is called. `InvalidState` before the item is valid.
    pub fn get_mut(&mut self) -> Result<&mut T> {
        self.require_valid()?;
        Ok(&mut self.data)
    }

    fn require_valid(&self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(ModelError::invalid_state(format!(
                "cannot read document {} before it is loaded",
                self.doc_ref
            )))
        }
    }

    /// A single-document query over this item's identity, usable for
    /// watching the document or re-reading it without touching this handle.
    pub fn as_query(&self) -> DocumentQuery<T> {
        DocumentQuery::new(
            self.store.clone(),
            self.doc_ref.clone(),
            Arc::clone(&self.base),
        )
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Persist the payload.
    ///
    /// A local-only item is written with merge semantics — its id may
    /// coincide with a document already partially populated by another
    /// process, and a destructive replace would lose that data. Afterwards
    /// the item is no longer local-only, and subsequent saves update the
    /// full field set of the existing document.
    pub async fn save(&mut self) -> Result<()> {
        let transport = self.store.require()?;
        let payload = serde_json::to_value(&self.data)?;

        if self.local_only {
            transport
                .write_merge(&self.doc_ref.collection, &self.doc_ref.id, payload)
                .await?;
            self.local_only = false;
            debug!(doc = %self.doc_ref, "first save (merge)");
        } else {
            transport
                .write_patch(&self.doc_ref.collection, &self.doc_ref.id, payload, true)
                .await?;
            debug!(doc = %self.doc_ref, "save (update)");
        }
        Ok(())
    }

    /// Fetch the document by identity and overwrite the local payload.
    ///
    /// `ItemDoesNotExist` when the store has no document at this identity.
    pub async fn load(&mut self) -> Result<()> {
        match self.as_query().get().await? {
            Some(data) => {
                self.data = data;
                self.local_only = false;
                self.valid = true;
                Ok(())
            }
            None => Err(ModelError::ItemDoesNotExist {
                collection: self.doc_ref.collection.clone(),
                id: self.doc_ref.id.clone(),
            }),
        }
    }

    /// Apply `patch` (a JSON object of field values) to the local payload
    /// immediately, then write it: a full merge save when local-only,
    /// otherwise an update restricted to the patch's fields.
    pub async fn set(&mut self, patch: Value) -> Result<()> {
        let transport = self.store.require()?;

        // Optimistic local apply.
        let mut current = serde_json::to_value(&self.data)?;
        shallow_merge(&mut current, &patch);
        self.data = serde_json::from_value(current)?;

        if self.local_only {
            self.save().await
        } else {
            transport
                .write_patch(&self.doc_ref.collection, &self.doc_ref.id, patch, true)
                .await?;
            Ok(())
        }
    }

    /// Delete the document from the store.
    ///
    /// `InvalidState` when local-only (nothing persisted to delete). The
    /// `local_only`/`valid` flags are deliberately untouched: other holders
    /// of the same identity may still consider the document present, and
    /// flipping this handle back to local-only would let two independent
    /// restorations race and silently overwrite each other. Callers must
    /// stop using a deleted item themselves; restoring the identity takes a
    /// fresh local item.
    pub async fn delete(&self) -> Result<()> {
        if self.local_only {
            return Err(ModelError::invalid_state(format!(
                "cannot delete {}: item was never saved",
                self.doc_ref
            )));
        }
        let transport = self.store.require()?;
        transport
            .delete(&self.doc_ref.collection, &self.doc_ref.id)
            .await?;
        debug!(doc = %self.doc_ref, "delete");
        Ok(())
    }
}
