//! Deployment manifest schema for Helmsman.
//!
//! This crate defines the versioned TOML manifest describing a deployment:
//! which components (charms) make up the control plane, which channel and
//! revision each tracks, and which provisioning plans exist with their
//! variable defaults and preserve lists. It also provides the string
//! newtypes shared across the workspace.

pub mod manifest;
pub mod types;

pub use manifest::{
    parse_manifest_file, parse_manifest_str, ComponentKind, ComponentSpec, ManifestError,
    ManifestV1, PlanSpec,
};
pub use types::{ModelName, UnitName};
