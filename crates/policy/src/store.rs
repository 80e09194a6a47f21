//! Process-wide active policy document.

use crate::{Error, Result, RolePolicyDocument, builtin_document, validate_role_policy_document};
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};

struct Active {
    document: Arc<RolePolicyDocument>,
    revision: u64,
}

/// Owner of the active [`RolePolicyDocument`].
///
/// Reads hand out a shared `Arc`; writes replace the whole document at once.
/// There is no way to mutate the active document in place.
pub struct PolicyStore {
    active: RwLock<Active>,
}

impl PolicyStore {
    /// Create a store holding the built-in document.
    pub fn new() -> Self {
        Self::with_document(builtin_document().clone())
    }

    pub fn with_document(document: RolePolicyDocument) -> Self {
        Self {
            active: RwLock::new(Active {
                document: Arc::new(document),
                revision: 0,
            }),
        }
    }

    /// The currently active document.
    pub fn get(&self) -> Arc<RolePolicyDocument> {
        let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&active.document)
    }

    /// Number of successful swaps since creation.
    pub fn revision(&self) -> u64 {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .revision
    }

    /// Replace the active document if it is still `expected`.
    ///
    /// Returns the new revision, or [`Error::Conflict`] when another writer
    /// swapped the document first.
    pub fn compare_and_swap(
        &self,
        expected: &Arc<RolePolicyDocument>,
        next: RolePolicyDocument,
    ) -> Result<u64> {
        let mut active = self.active.write().map_err(|_| Error::Poisoned)?;
        if !Arc::ptr_eq(&active.document, expected) {
            return Err(Error::Conflict {
                expected: expected.version(),
                found: active.document.version(),
            });
        }
        active.document = Arc::new(next);
        active.revision += 1;
        tracing::info!(
            revision = active.revision,
            version = active.document.version(),
            "policy document swapped"
        );
        Ok(active.revision)
    }

    /// Validate `raw` and make it the active document.
    pub fn publish(&self, raw: &Value) -> Result<u64> {
        let next = validate_role_policy_document(raw)?;
        let current = self.get();
        self.compare_and_swap(&current, next)
    }

    /// Tear down to the built-in document.
    pub fn reset(&self) -> Result<()> {
        let mut active = self.active.write().map_err(|_| Error::Poisoned)?;
        active.document = Arc::new(builtin_document().clone());
        active.revision += 1;
        Ok(())
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Decision;
    use serde_json::json;

    fn doc(version: u64, decision: &str) -> Value {
        json!({
            "version": version,
            "roles": { "host": { "surfaces": { "command.dispatch": { "nextStep": decision } } } }
        })
    }

    #[test]
    fn starts_with_builtin() {
        let store = PolicyStore::new();
        assert_eq!(*store.get(), *builtin_document());
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn publish_swaps_whole_document() {
        let store = PolicyStore::with_document(RolePolicyDocument::deny_all());
        let before = store.get();
        assert_eq!(store.publish(&doc(2, "allow")).unwrap(), 1);
        let after = store.get();
        assert_eq!(after.version(), 2);
        assert_eq!(after.resolve("host", "command.dispatch", "nextStep"), Decision::Allow);
        // readers holding the old Arc keep a consistent view
        assert_eq!(before.resolve("host", "command.dispatch", "nextStep"), Decision::Deny);
    }

    #[test]
    fn invalid_publish_leaves_store_untouched() {
        let store = PolicyStore::with_document(RolePolicyDocument::deny_all());
        let err = store.publish(&doc(2, "maybe")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(store.get().version(), 1);
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn stale_compare_and_swap_conflicts() {
        let store = PolicyStore::with_document(RolePolicyDocument::deny_all());
        let stale = store.get();
        store.publish(&doc(2, "allow")).unwrap();
        let next = validate_role_policy_document(&doc(3, "deny")).unwrap();
        let err = store.compare_and_swap(&stale, next).unwrap_err();
        assert!(matches!(err, Error::Conflict { expected: 1, found: 2 }));
        assert_eq!(store.get().version(), 2);
    }

    #[test]
    fn reset_restores_builtin() {
        let store = PolicyStore::new();
        store.publish(&doc(5, "allow")).unwrap();
        store.reset().unwrap();
        assert_eq!(*store.get(), *builtin_document());
    }
}
