use super::{json_pretty, EXIT_SUCCESS};
use helmsman_cluster::{read_config, ClusterError, ConfigStore};
use helmsman_core::plan_config_key;
use serde_json::Value;
use std::collections::BTreeMap;

pub fn run(store: &dyn ConfigStore, plan: &str) -> Result<u8, String> {
    let key = plan_config_key(plan);
    let vars: BTreeMap<String, Value> = match read_config(store, &key) {
        Ok(vars) => vars,
        Err(ClusterError::NotFound(_)) => {
            return Err(format!("no variables recorded for plan '{plan}'"));
        }
        Err(e) => return Err(e.to_string()),
    };
    println!("{}", json_pretty(&vars)?);
    Ok(EXIT_SUCCESS)
}
