use super::{json_pretty, EXIT_SUCCESS};
use helmsman_cluster::ConfigStore;
use helmsman_core::upgrade::load_upgrade_state;

pub fn run(store: &dyn ConfigStore) -> Result<u8, String> {
    match load_upgrade_state(store).map_err(|e| e.to_string())? {
        Some(state) => println!("{}", json_pretty(&state)?),
        None => println!("no upgrade in progress"),
    }
    Ok(EXIT_SUCCESS)
}
