//! Orchestration runtime for Helmsman.
//!
//! This crate is the core of the system: the Step/Plan execution model every
//! operation is built from, the variable reconciler that computes desired
//! provisioning state from layered sources, the concurrent status monitor
//! that observes long-running convergence, and the resumable upgrade
//! coordinators built on top of all three.

pub mod deployment;
pub mod interrupt;
pub mod monitor;
pub mod plan;
pub mod reconcile;
pub mod result;
pub mod step;
pub mod upgrade;

pub use deployment::Deployment;
pub use interrupt::{install_signal_handler, shutdown_requested};
pub use monitor::{wait_until_status, StatusMonitor, StatusSnapshot};
pub use plan::run_plan;
pub use reconcile::{plan_config_key, Reconciler};
pub use result::{ResultKind, StepResult};
pub use step::Step;
pub use upgrade::{
    ChannelUpgradeCoordinator, LatestInChannelCoordinator, MysqlUpgradeCoordinator,
    UpgradeCoordinator,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("cluster error: {0}")]
    Cluster(#[from] helmsman_cluster::ClusterError),
    #[error("control plane error: {0}")]
    Plane(#[from] helmsman_runtime::PlaneError),
    #[error("provisioning error: {0}")]
    Provision(#[from] helmsman_runtime::ProvisionError),
    #[error("manifest error: {0}")]
    Manifest(#[from] helmsman_schema::ManifestError),
    #[error("manifest declares no plan named '{0}'")]
    UnknownPlan(String),
    #[error("timed out waiting for {components:?} to reach one of {targets:?}")]
    Timeout {
        components: Vec<String>,
        targets: Vec<String>,
    },
    #[error("components reported error status: {components:?}")]
    Wait { components: Vec<String> },
    #[error("status monitor failed: {0}")]
    Monitor(String),
    #[error("{0}")]
    Upgrade(String),
    #[error("prompt failed: {0}")]
    Prompt(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
