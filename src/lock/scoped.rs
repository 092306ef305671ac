//! Locks scoped to one document of a business collection.

use super::lease::{KeyResolver, LeaseLock};
use crate::error::{LeaseError, Result};
use crate::store::{DocumentSource, LockKey, LockStore, TargetFilter};
use std::sync::Arc;
use std::time::Duration;

/// Resolves to `(id of the first matching document, collection)`.
pub struct ScopedTarget {
    documents: Arc<dyn DocumentSource>,
    collection: String,
    filter: TargetFilter,
}

impl ScopedTarget {
    pub fn new(
        documents: Arc<dyn DocumentSource>,
        collection: impl Into<String>,
        filter: TargetFilter,
    ) -> Self {
        Self {
            documents,
            collection: collection.into(),
            filter,
        }
    }
}

impl KeyResolver for ScopedTarget {
    fn resolve(&self) -> Result<LockKey> {
        let target_id = self
            .documents
            .find_first_id(&self.collection, &self.filter)
            .map_err(|e| {
                LeaseError::Init(format!(
                    "failed to look up target in collection '{}': {}",
                    self.collection, e
                ))
            })?
            .ok_or_else(|| {
                LeaseError::Init(format!(
                    "no document in collection '{}' matches {}",
                    self.collection, self.filter
                ))
            })?;

        Ok(LockKey::scoped(&target_id, &self.collection))
    }
}

/// A lock on one document, identified by a filter against its collection.
pub type ScopedExclusiveLock = LeaseLock<ScopedTarget>;

impl LeaseLock<ScopedTarget> {
    pub fn new(
        store: Arc<dyn LockStore>,
        documents: Arc<dyn DocumentSource>,
        collection: impl Into<String>,
        filter: TargetFilter,
        lease_duration: Duration,
    ) -> Self {
        Self::with_resolver(
            store,
            ScopedTarget::new(documents, collection, filter),
            lease_duration,
        )
    }
}
