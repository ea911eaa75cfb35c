//! Typed JSON helpers over the raw byte interface of `ConfigStore`.

use crate::{ClusterError, ConfigStore};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read and deserialize the JSON value stored under `key`.
pub fn read_config<T: DeserializeOwned>(
    store: &dyn ConfigStore,
    key: &str,
) -> Result<T, ClusterError> {
    let raw = store.get(key)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Serialize `value` as JSON and store it under `key`, replacing any
/// previous value.
pub fn update_config<T: Serialize>(
    store: &dyn ConfigStore,
    key: &str,
    value: &T,
) -> Result<(), ClusterError> {
    let raw = serde_json::to_vec(value)?;
    store.put(key, &raw)
}

/// Delete the value stored under `key`.
pub fn delete_config(store: &dyn ConfigStore, key: &str) -> Result<(), ClusterError> {
    store.delete(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use std::collections::BTreeMap;

    #[test]
    fn typed_roundtrip() {
        let store = MemoryStore::new();
        let mut vars = BTreeMap::new();
        vars.insert("ha-scale".to_owned(), serde_json::json!(3));
        update_config(&store, "terraform-vars-control-plane", &vars).unwrap();

        let loaded: BTreeMap<String, serde_json::Value> =
            read_config(&store, "terraform-vars-control-plane").unwrap();
        assert_eq!(loaded, vars);
    }

    #[test]
    fn read_missing_key_maps_to_not_found() {
        let store = MemoryStore::new();
        let result: Result<BTreeMap<String, serde_json::Value>, _> =
            read_config(&store, "absent");
        assert!(matches!(result, Err(ClusterError::NotFound(_))));
    }
}
