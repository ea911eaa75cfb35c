//! Handles to the external systems Helmsman orchestrates.
//!
//! Two black boxes live behind traits here: the charm-based workload control
//! plane (`ControlPlane`, backed by the `juju` CLI in production) and the
//! infrastructure-as-code provisioning engine (`Provisioner`, backed by the
//! `terraform` binary). Both ship mock implementations that record calls and
//! serve scripted state, so the orchestration runtime is testable without
//! either system present.

pub mod juju;
pub mod mock;
pub mod plane;
pub mod terraform;

pub use juju::JujuCliPlane;
pub use mock::{MockPlane, PlaneCall};
pub use plane::{select_plane, ApplicationStatus, ControlPlane, PhaseSource, UnitStatus};
pub use terraform::{MockProvisioner, Provisioner, TerraformEngine};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaneError {
    #[error("application not found: {0}")]
    ApplicationNotFound(String),
    #[error("no leader unit found for application: {0}")]
    LeaderNotFound(String),
    #[error("action '{action}' failed on {unit}: {message}")]
    ActionFailed {
        unit: String,
        action: String,
        message: String,
    },
    #[error("control plane unavailable: {0}")]
    Unavailable(String),
    #[error("unknown control plane backend: {0}")]
    UnknownBackend(String),
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("terraform {command} failed: {message}")]
    Execution { command: String, message: String },
    #[error("failed to parse terraform output: {0}")]
    Output(String),
    #[error("provisioning I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("variable serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
