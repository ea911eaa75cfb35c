use crate::{ClusterError, ConfigStore};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// In-process Config Store used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, ClusterError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| ClusterError::Unavailable(format!("mutex poisoned: {e}")))?;
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(key.to_owned()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), ClusterError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| ClusterError::Unavailable(format!("mutex poisoned: {e}")))?;
        entries.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), ClusterError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| ClusterError::Unavailable(format!("mutex poisoned: {e}")))?;
        entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| ClusterError::NotFound(key.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_key_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get("absent"),
            Err(ClusterError::NotFound(_))
        ));
    }

    #[test]
    fn put_then_get_roundtrip() {
        let store = MemoryStore::new();
        store.put("key", b"value").unwrap();
        assert_eq!(store.get("key").unwrap(), b"value");
    }

    #[test]
    fn put_overwrites_whole_value() {
        let store = MemoryStore::new();
        store.put("key", b"first").unwrap();
        store.put("key", b"second").unwrap();
        assert_eq!(store.get("key").unwrap(), b"second");
    }

    #[test]
    fn delete_missing_key_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.delete("absent"),
            Err(ClusterError::NotFound(_))
        ));
        store.put("key", b"value").unwrap();
        store.delete("key").unwrap();
        assert!(store.is_empty());
    }
}
