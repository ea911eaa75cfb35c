use crate::PlaneError;
use helmsman_schema::{ModelName, UnitName};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which status field convergence is judged on. Control-plane (k8s)
/// components settle on workload status, machine components on agent
/// status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseSource {
    Workload,
    Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitStatus {
    pub name: UnitName,
    #[serde(default)]
    pub leader: bool,
    pub workload_phase: String,
    #[serde(default)]
    pub workload_message: String,
    pub agent_phase: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationStatus {
    pub name: String,
    pub channel: String,
    pub revision: u64,
    pub scale: u32,
    pub units: Vec<UnitStatus>,
}

// Worst-first phase rankings. A phase not listed ranks as most severe, so
// an unrecognized phase never reads as converged.
const WORKLOAD_SEVERITY: &[&str] = &["error", "maintenance", "waiting", "blocked", "unknown", "active"];
const AGENT_SEVERITY: &[&str] = &["error", "lost", "allocating", "executing", "idle"];

fn severity(ranking: &[&str], phase: &str) -> usize {
    ranking.iter().position(|p| *p == phase).unwrap_or(0)
}

impl ApplicationStatus {
    /// Collapse unit phases into a single application phase: the most
    /// severe phase any unit reports. An application with no units is
    /// `unknown` (deployed without units).
    pub fn aggregate_phase(&self, source: PhaseSource) -> String {
        let ranking = match source {
            PhaseSource::Workload => WORKLOAD_SEVERITY,
            PhaseSource::Agent => AGENT_SEVERITY,
        };
        self.units
            .iter()
            .map(|unit| match source {
                PhaseSource::Workload => unit.workload_phase.as_str(),
                PhaseSource::Agent => unit.agent_phase.as_str(),
            })
            .min_by_key(|phase| severity(ranking, phase))
            .unwrap_or("unknown")
            .to_owned()
    }

    /// The unit with the highest ordinal, if any.
    pub fn highest_unit(&self) -> Option<&UnitStatus> {
        self.units
            .iter()
            .max_by_key(|unit| unit.name.ordinal().unwrap_or(0))
    }
}

/// Operations Helmsman consumes from the workload control plane. All
/// implementations must be safe to share across the monitor thread and the
/// plan thread.
pub trait ControlPlane: Send + Sync {
    fn get_application_status(
        &self,
        model: &ModelName,
        application: &str,
    ) -> Result<ApplicationStatus, PlaneError>;

    fn run_action(
        &self,
        model: &ModelName,
        unit: &UnitName,
        action: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, PlaneError>;

    fn scale_application(
        &self,
        model: &ModelName,
        application: &str,
        scale: u32,
    ) -> Result<(), PlaneError>;

    /// Refresh a charm. `channel: None` refreshes to the latest revision in
    /// the currently-tracked channel; `revision` pins an exact revision.
    fn refresh_charm(
        &self,
        model: &ModelName,
        application: &str,
        channel: Option<&str>,
        revision: Option<u64>,
    ) -> Result<(), PlaneError>;

    fn get_leader_unit(
        &self,
        model: &ModelName,
        application: &str,
    ) -> Result<UnitName, PlaneError>;

    /// Latest charm revision published in `channel`.
    fn get_available_revision(&self, charm: &str, channel: &str) -> Result<u64, PlaneError>;
}

pub fn select_plane(name: &str) -> Result<Arc<dyn ControlPlane>, PlaneError> {
    match name {
        "juju" => Ok(Arc::new(crate::juju::JujuCliPlane::new())),
        "mock" => Ok(Arc::new(crate::mock::MockPlane::new())),
        other => Err(PlaneError::UnknownBackend(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, workload: &str, agent: &str) -> UnitStatus {
        UnitStatus {
            name: UnitName::new(name),
            leader: false,
            workload_phase: workload.to_owned(),
            workload_message: String::new(),
            agent_phase: agent.to_owned(),
        }
    }

    fn app(units: Vec<UnitStatus>) -> ApplicationStatus {
        ApplicationStatus {
            name: "mysql".to_owned(),
            channel: "8.0/stable".to_owned(),
            revision: 211,
            scale: units.len() as u32,
            units,
        }
    }

    #[test]
    fn aggregate_picks_most_severe_workload_phase() {
        let status = app(vec![
            unit("mysql/0", "active", "idle"),
            unit("mysql/1", "waiting", "executing"),
        ]);
        assert_eq!(status.aggregate_phase(PhaseSource::Workload), "waiting");
        assert_eq!(status.aggregate_phase(PhaseSource::Agent), "executing");
    }

    #[test]
    fn aggregate_of_unitless_application_is_unknown() {
        let status = app(Vec::new());
        assert_eq!(status.aggregate_phase(PhaseSource::Workload), "unknown");
    }

    #[test]
    fn unrecognized_phase_never_reads_as_converged() {
        let status = app(vec![
            unit("mysql/0", "active", "idle"),
            unit("mysql/1", "upgrading", "idle"),
        ]);
        assert_eq!(status.aggregate_phase(PhaseSource::Workload), "upgrading");
    }

    #[test]
    fn highest_unit_by_ordinal() {
        let status = app(vec![
            unit("mysql/0", "active", "idle"),
            unit("mysql/2", "active", "idle"),
            unit("mysql/1", "active", "idle"),
        ]);
        assert_eq!(status.highest_unit().unwrap().name.as_str(), "mysql/2");
    }

    #[test]
    fn select_valid_backends() {
        assert!(select_plane("juju").is_ok());
        assert!(select_plane("mock").is_ok());
        assert!(select_plane("nonexistent").is_err());
    }
}
