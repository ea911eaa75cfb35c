pub mod config;
pub mod refresh;
pub mod state;
pub mod vars;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_CONFIG_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Map a top-level error message onto the exit code families.
pub fn classify_error(message: &str) -> u8 {
    if message.starts_with("manifest error:")
        || message.starts_with("failed to parse manifest")
        || message.starts_with("failed to read manifest")
    {
        EXIT_MANIFEST_ERROR
    } else if message.starts_with("cluster error:")
        || message.starts_with("cluster service unavailable")
        || message.starts_with("config key not found")
    {
        EXIT_CONFIG_ERROR
    } else {
        EXIT_FAILURE
    }
}
