use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory byte sources addressable as `blob:<n>` URIs.
///
/// Local processing registers its output here so the result can be loaded
/// and auditioned through the regular playback path.
#[derive(Clone, Default)]
pub struct BlobRegistry {
    blobs: Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>,
    next_id: Arc<AtomicU64>,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Vec<u8>>>> {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Vec<u8>>>> {
        self.blobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store bytes and return the URI they can be loaded from.
    pub fn register(&self, bytes: Vec<u8>) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let uri = format!("blob:{}", id);
        self.write().insert(uri.clone(), Arc::new(bytes));
        uri
    }

    pub fn get(&self, uri: &str) -> Option<Arc<Vec<u8>>> {
        self.read().get(uri).cloned()
    }

    pub fn release(&self, uri: &str) -> bool {
        self.write().remove(uri).is_some()
    }

    /// Drop every blob. Ids are not reused afterwards.
    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_get_release() {
        let registry = BlobRegistry::new();
        let first = registry.register(vec![1, 2, 3]);
        let second = registry.register(vec![4]);
        assert_ne!(first, second);
        assert!(first.starts_with("blob:"));
        assert_eq!(registry.get(&first).unwrap().as_slice(), &[1, 2, 3]);

        assert!(registry.release(&first));
        assert!(!registry.release(&first));
        assert!(registry.get(&first).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clear_drops_all_without_reusing_ids() {
        let registry = BlobRegistry::new();
        let first = registry.register(vec![1]);
        registry.register(vec![2]);

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get(&first).is_none());
        assert_ne!(registry.register(vec![3]), first);
    }

    #[test]
    fn test_clones_share_storage() {
        let registry = BlobRegistry::new();
        let clone = registry.clone();
        let uri = clone.register(vec![9]);
        assert!(registry.get(&uri).is_some());
    }
}
