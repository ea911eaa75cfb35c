use super::EXIT_SUCCESS;
use helmsman_cluster::{read_config, update_config, ClusterError, ConfigStore};
use helmsman_core::{
    ChannelUpgradeCoordinator, Deployment, LatestInChannelCoordinator, MysqlUpgradeCoordinator,
    UpgradeCoordinator,
};
use helmsman_schema::{parse_manifest_file, ManifestV1};
use std::path::Path;
use tracing::debug;

/// Config Store key holding the deployment manifest last accepted by the
/// operator.
const MANIFEST_KEY: &str = "deployment-manifest";

pub fn run(
    deployment: &Deployment,
    manifest_path: Option<&Path>,
    upgrade_release: bool,
    reset_mysql_upgrade_state: bool,
    interactive: bool,
    accept_defaults: bool,
) -> Result<u8, String> {
    let manifest = load_manifest(deployment.store.as_ref(), manifest_path)?;

    let coordinators: Vec<Box<dyn UpgradeCoordinator>> = if upgrade_release {
        vec![Box::new(ChannelUpgradeCoordinator::new(
            deployment.clone(),
            manifest,
        ))]
    } else {
        vec![
            Box::new(MysqlUpgradeCoordinator::new(
                deployment.clone(),
                manifest.clone(),
                reset_mysql_upgrade_state,
            )),
            Box::new(LatestInChannelCoordinator::new(
                deployment.clone(),
                manifest,
            )),
        ]
    };

    for coordinator in coordinators {
        let result = coordinator.run_plan(interactive, accept_defaults);
        if result.is_failed() {
            return Err(result.message().to_owned());
        }
    }

    println!("refresh complete");
    Ok(EXIT_SUCCESS)
}

/// Resolve the manifest to refresh against: an explicit `--manifest` is
/// validated and persisted for later runs; otherwise the previously
/// persisted manifest is used.
fn load_manifest(
    store: &dyn ConfigStore,
    manifest_path: Option<&Path>,
) -> Result<ManifestV1, String> {
    if let Some(path) = manifest_path {
        let manifest = parse_manifest_file(path).map_err(|e| e.to_string())?;
        update_config(store, MANIFEST_KEY, &manifest).map_err(|e| e.to_string())?;
        debug!("persisted manifest from {}", path.display());
        return Ok(manifest);
    }
    match read_config(store, MANIFEST_KEY) {
        Ok(manifest) => Ok(manifest),
        Err(ClusterError::NotFound(_)) => {
            Err("no manifest persisted yet; pass --manifest <path>".to_owned())
        }
        Err(e) => Err(e.to_string()),
    }
}
