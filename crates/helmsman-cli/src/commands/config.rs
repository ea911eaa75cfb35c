use super::EXIT_SUCCESS;
use helmsman_cluster::ConfigStore;

pub fn get(store: &dyn ConfigStore, key: &str) -> Result<u8, String> {
    let raw = store.get(key).map_err(|e| e.to_string())?;
    println!("{}", String::from_utf8_lossy(&raw));
    Ok(EXIT_SUCCESS)
}

pub fn set(store: &dyn ConfigStore, key: &str, value: &str) -> Result<u8, String> {
    store
        .put(key, value.as_bytes())
        .map_err(|e| e.to_string())?;
    Ok(EXIT_SUCCESS)
}

pub fn delete(store: &dyn ConfigStore, key: &str) -> Result<u8, String> {
    store.delete(key).map_err(|e| e.to_string())?;
    Ok(EXIT_SUCCESS)
}
