use helmsman_cluster::ConfigStore;
use helmsman_runtime::{ControlPlane, Provisioner};
use helmsman_schema::ModelName;
use std::sync::Arc;

/// Shared handles and model names for one deployment. Steps and
/// coordinators receive a clone of this at construction; nothing here is
/// ambient or global.
#[derive(Clone)]
pub struct Deployment {
    pub store: Arc<dyn ConfigStore>,
    pub plane: Arc<dyn ControlPlane>,
    pub provisioner: Arc<dyn Provisioner>,
    /// Model hosting the k8s control-plane components.
    pub control_model: ModelName,
    /// Model hosting the machine components.
    pub machine_model: ModelName,
}

impl Deployment {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        plane: Arc<dyn ControlPlane>,
        provisioner: Arc<dyn Provisioner>,
        control_model: ModelName,
        machine_model: ModelName,
    ) -> Self {
        Self {
            store,
            plane,
            provisioner,
            control_model,
            machine_model,
        }
    }
}
