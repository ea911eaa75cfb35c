//! Resumable, crash-safe in-channel upgrade of the mysql cluster.
//!
//! The whole upgrade is one step whose internal state machine is persisted
//! to the Config Store after every successful phase. Each phase method is a
//! no-op when the persisted state already satisfies-or-exceeds that phase,
//! so the step can be re-run after a crash or failure and resumes at the
//! first unmet phase.

use crate::deployment::Deployment;
use crate::monitor::{wait_until_status_with_interval, DEFAULT_POLL_INTERVAL};
use crate::plan::update_status;
use crate::result::StepResult;
use crate::step::Step;
use crate::upgrade::UpgradeCoordinator;
use crate::CoreError;
use chrono::Utc;
use helmsman_cluster::{delete_config, read_config, update_config, ClusterError, ConfigStore};
use helmsman_runtime::{PhaseSource, PlaneError};
use helmsman_schema::{ManifestV1, UnitName};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const MYSQL_UPGRADE_STATE_KEY: &str = "mysql-upgrade-state";
const MYSQL_COMPONENT: &str = "mysql";

const UPGRADE_ALL_UNITS_TIMEOUT: Duration = Duration::from_secs(3600);
const UPGRADE_HIGHEST_UNIT_TIMEOUT: Duration = Duration::from_secs(900);
const SCALE_TIMEOUT: Duration = Duration::from_secs(1200);

/// Progress through the upgrade. Declaration order defines the
/// progression; the derived `Ord` is what the resume logic compares with,
/// so inserting a phase later keeps comparisons meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpgradeState {
    Init,
    OriginalStateRecorded,
    ScaledUp,
    PrecheckDone,
    HighestUnitUpgraded,
    UpgradeResumed,
    UnitsSettled,
    ScaledBack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedUpgradeState {
    pub state: UpgradeState,
    pub original_scale: Option<u32>,
    pub original_revision: Option<u64>,
    pub updated_at: String,
}

/// Replica count to hold during the upgrade: the nearest odd number above
/// the original, keeping quorum while a unit restarts.
pub fn target_scale(original_scale: u32) -> u32 {
    let mut target = original_scale + 1;
    if target % 2 == 0 {
        target += 1;
    }
    target
}

/// Load the persisted upgrade state. A missing key means no upgrade is in
/// progress; a malformed value is treated the same, with a warning.
pub fn load_upgrade_state(
    store: &dyn ConfigStore,
) -> Result<Option<PersistedUpgradeState>, CoreError> {
    match read_config(store, MYSQL_UPGRADE_STATE_KEY) {
        Ok(state) => Ok(Some(state)),
        Err(ClusterError::NotFound(_)) => Ok(None),
        Err(ClusterError::Serialization(e)) => {
            warn!("found malformed mysql upgrade state: {e}");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Drop the persisted upgrade state so the next run starts fresh.
pub fn reset_upgrade_state(store: &dyn ConfigStore) -> Result<(), CoreError> {
    match delete_config(store, MYSQL_UPGRADE_STATE_KEY) {
        Ok(()) | Err(ClusterError::NotFound(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub struct MysqlUpgradeStep {
    deployment: Deployment,
    manifest: ManifestV1,
    application: String,
    state: UpgradeState,
    original_scale: Option<u32>,
    original_revision: Option<u64>,
    poll_interval: Duration,
}

impl MysqlUpgradeStep {
    /// Construct the step, loading any persisted upgrade state so a rerun
    /// resumes at the first unmet phase.
    pub fn new(
        deployment: Deployment,
        manifest: ManifestV1,
        reset_state: bool,
    ) -> Result<Self, CoreError> {
        if reset_state {
            debug!("resetting mysql upgrade state");
            reset_upgrade_state(deployment.store.as_ref())?;
        }
        let persisted = load_upgrade_state(deployment.store.as_ref())?;
        let (state, original_scale, original_revision) = persisted
            .map_or((UpgradeState::Init, None, None), |p| {
                (p.state, p.original_scale, p.original_revision)
            });
        Ok(Self {
            deployment,
            manifest,
            application: MYSQL_COMPONENT.to_owned(),
            state,
            original_scale,
            original_revision,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn state(&self) -> UpgradeState {
        self.state
    }

    fn set_state(&mut self, state: UpgradeState) -> Result<(), CoreError> {
        self.state = state;
        update_config(
            self.deployment.store.as_ref(),
            MYSQL_UPGRADE_STATE_KEY,
            &PersistedUpgradeState {
                state,
                original_scale: self.original_scale,
                original_revision: self.original_revision,
                updated_at: Utc::now().to_rfc3339(),
            },
        )?;
        debug!("mysql upgrade state {state:?}");
        Ok(())
    }

    /// Build the domain error for a failed phase: the message always names
    /// the recorded original revision as the manual rollback target.
    fn upgrade_error(&self, context: &str) -> CoreError {
        let recovery = match self.original_revision {
            Some(revision) => format!(
                "re-run the refresh to resume, or roll back by refreshing {} to revision {revision}",
                self.application
            ),
            None => "re-run the refresh to resume from the last recorded phase".to_owned(),
        };
        CoreError::Upgrade(format!("mysql upgrade failed: {context}; {recovery}"))
    }

    fn wait_active(
        &self,
        timeout: Duration,
        status: Option<&ProgressBar>,
    ) -> Result<(), CoreError> {
        wait_until_status_with_interval(
            &self.deployment.plane,
            &self.deployment.control_model,
            &[self.application.clone()],
            PhaseSource::Workload,
            &["active"],
            timeout,
            status,
            self.poll_interval,
        )
    }

    fn record_original_state(&mut self, _status: Option<&ProgressBar>) -> Result<(), CoreError> {
        if self.state >= UpgradeState::OriginalStateRecorded {
            return Ok(());
        }
        let app = self
            .deployment
            .plane
            .get_application_status(&self.deployment.control_model, &self.application)
            .map_err(|e| self.upgrade_error(&format!("could not read application status: {e}")))?;
        self.original_revision = Some(app.revision);
        self.original_scale = Some(app.scale);
        debug!(
            "recorded original mysql revision {} and scale {}",
            app.revision, app.scale
        );
        self.set_state(UpgradeState::OriginalStateRecorded)
    }

    fn scale_up(&mut self, status: Option<&ProgressBar>) -> Result<(), CoreError> {
        if self.state >= UpgradeState::ScaledUp {
            return Ok(());
        }
        let original = self.original_scale.ok_or_else(|| {
            CoreError::Upgrade(
                "original mysql scale was not recorded before scale-up; \
                 reset the upgrade state and start over"
                    .to_owned(),
            )
        })?;
        let target = target_scale(original);
        update_status(
            status,
            &format!("Scaling {} up to {target} units for the upgrade...", self.application),
        );
        self.deployment
            .plane
            .scale_application(&self.deployment.control_model, &self.application, target)
            .map_err(|e| {
                self.upgrade_error(&format!("failed to scale up to {target} units: {e}"))
            })?;
        self.wait_active(SCALE_TIMEOUT, status).map_err(|e| {
            self.upgrade_error(&format!(
                "timed out waiting for {} to settle after scaling to {target} units: {e}",
                self.application
            ))
        })?;
        self.set_state(UpgradeState::ScaledUp)
    }

    fn run_precheck(&mut self, status: Option<&ProgressBar>) -> Result<(), CoreError> {
        if self.state >= UpgradeState::PrecheckDone {
            return Ok(());
        }
        update_status(status, "Running pre-upgrade check on the mysql leader...");
        let leader = self
            .deployment
            .plane
            .get_leader_unit(&self.deployment.control_model, &self.application)
            .map_err(|e| self.upgrade_error(&format!("unable to determine leader unit: {e}")))?;
        self.deployment
            .plane
            .run_action(
                &self.deployment.control_model,
                &leader,
                "pre-upgrade-check",
                &serde_json::json!({}),
            )
            .map_err(|e| {
                self.upgrade_error(&format!("pre-upgrade-check failed on {leader}: {e}"))
            })?;
        self.set_state(UpgradeState::PrecheckDone)
    }

    fn wait_for_highest_unit(&self, unit: &UnitName) -> Result<(), CoreError> {
        let deadline = Instant::now() + UPGRADE_HIGHEST_UNIT_TIMEOUT;
        loop {
            let app = self
                .deployment
                .plane
                .get_application_status(&self.deployment.control_model, &self.application)
                .map_err(|e| {
                    self.upgrade_error(&format!("could not read application status: {e}"))
                })?;
            if let Some(found) = app.units.iter().find(|u| u.name == *unit) {
                // The charm reports completion on the refreshed unit before
                // the rest of the cluster moves.
                if found.workload_phase == "maintenance"
                    && found
                        .workload_message
                        .to_lowercase()
                        .contains("upgrade completed")
                    && found.agent_phase == "idle"
                {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(self.upgrade_error(&format!(
                    "timed out waiting for highest unit {unit} to complete its upgrade"
                )));
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    fn refresh_and_wait_highest(&mut self, status: Option<&ProgressBar>) -> Result<(), CoreError> {
        if self.state >= UpgradeState::HighestUnitUpgraded {
            return Ok(());
        }
        let app = self
            .deployment
            .plane
            .get_application_status(&self.deployment.control_model, &self.application)
            .map_err(|e| self.upgrade_error(&format!("could not read application status: {e}")))?;
        let highest = app
            .highest_unit()
            .map(|u| u.name.clone())
            .ok_or_else(|| self.upgrade_error("application has no units"))?;
        update_status(
            status,
            &format!("Refreshing charm and waiting for {highest} to upgrade..."),
        );
        self.deployment
            .plane
            .refresh_charm(&self.deployment.control_model, &self.application, None, None)
            .map_err(|e| self.upgrade_error(&format!("charm refresh failed: {e}")))?;
        self.wait_for_highest_unit(&highest)?;
        self.set_state(UpgradeState::HighestUnitUpgraded)
    }

    fn resume_upgrade(&mut self, status: Option<&ProgressBar>) -> Result<(), CoreError> {
        if self.state >= UpgradeState::UpgradeResumed {
            return Ok(());
        }
        update_status(status, "Resuming the upgrade across remaining units...");
        let leader = self
            .deployment
            .plane
            .get_leader_unit(&self.deployment.control_model, &self.application)
            .map_err(|e| {
                self.upgrade_error(&format!("no leader found to run resume-upgrade: {e}"))
            })?;
        self.deployment
            .plane
            .run_action(
                &self.deployment.control_model,
                &leader,
                "resume-upgrade",
                &serde_json::json!({}),
            )
            .map_err(|e| self.upgrade_error(&format!("resume-upgrade failed on {leader}: {e}")))?;
        self.set_state(UpgradeState::UpgradeResumed)
    }

    fn wait_until_settled(&mut self, status: Option<&ProgressBar>) -> Result<(), CoreError> {
        if self.state >= UpgradeState::UnitsSettled {
            return Ok(());
        }
        update_status(
            status,
            "Waiting for mysql units to complete the upgrade and settle...",
        );
        self.wait_active(UPGRADE_ALL_UNITS_TIMEOUT, status)
            .map_err(|e| {
                self.upgrade_error(&format!("units did not settle after resume: {e}"))
            })?;
        self.set_state(UpgradeState::UnitsSettled)
    }

    /// Scale back to the original replica count. Skipped when the original
    /// count was never recorded, or when the current scale does not match
    /// the upgrade's assumptions; failing here warns but does not fail an
    /// otherwise-complete upgrade.
    fn scale_back(&mut self, status: Option<&ProgressBar>) -> Result<(), CoreError> {
        if self.state >= UpgradeState::ScaledBack {
            return Ok(());
        }
        let Some(original) = self.original_scale else {
            warn!("mysql scale-back skipped: original scale is unknown");
            return Ok(());
        };
        let app = self
            .deployment
            .plane
            .get_application_status(&self.deployment.control_model, &self.application)
            .map_err(|e| self.upgrade_error(&format!("could not read application status: {e}")))?;
        let expected = target_scale(original);
        if app.scale != expected {
            warn!(
                "mysql scale-back skipped: current scale {} does not match upgrade scale {expected}",
                app.scale
            );
            return Ok(());
        }
        update_status(
            status,
            &format!("Scaling {} back to {original} units...", self.application),
        );
        if let Err(e) = self.deployment.plane.scale_application(
            &self.deployment.control_model,
            &self.application,
            original,
        ) {
            warn!("upgrade complete but scale-back to {original} units failed: {e}");
            return Ok(());
        }
        if let Err(e) = self.wait_active(SCALE_TIMEOUT, status) {
            warn!("upgrade complete but {} did not settle after scale-back: {e}", self.application);
            return Ok(());
        }
        self.set_state(UpgradeState::ScaledBack)
    }

    fn execute(&mut self, status: Option<&ProgressBar>) -> Result<(), CoreError> {
        self.record_original_state(status)?;
        self.scale_up(status)?;
        self.run_precheck(status)?;
        self.refresh_and_wait_highest(status)?;
        self.resume_upgrade(status)?;
        self.wait_until_settled(status)?;
        self.scale_back(status)?;
        Ok(())
    }
}

impl Step for MysqlUpgradeStep {
    fn name(&self) -> &str {
        "mysql-upgrade"
    }

    fn description(&self) -> &str {
        "Refreshing mysql to the latest in-channel charm revision"
    }

    fn is_skip(&mut self, _status: Option<&ProgressBar>) -> StepResult {
        let app = match self
            .deployment
            .plane
            .get_application_status(&self.deployment.control_model, &self.application)
        {
            Ok(app) => app,
            Err(PlaneError::ApplicationNotFound(_)) => {
                return StepResult::skipped("mysql application has not been deployed");
            }
            Err(e) => return StepResult::failed(format!("failed to read mysql status: {e}")),
        };

        let Some(spec) = self.manifest.component(MYSQL_COMPONENT) else {
            return StepResult::skipped("mysql is not declared in the manifest");
        };
        if spec.revision.is_some() {
            return StepResult::skipped(
                "mysql revision is pinned in the manifest and is handled by the provisioning plan",
            );
        }

        let deployed_track = app.channel.split('/').next().unwrap_or("");
        if !app.channel.is_empty() && deployed_track != spec.track() {
            return StepResult::skipped(format!(
                "mysql channel track differs between manifest ({}) and deployment ({deployed_track})",
                spec.track()
            ));
        }

        let channel = if app.channel.is_empty() {
            spec.channel.clone()
        } else {
            app.channel.clone()
        };
        let latest = match self
            .deployment
            .plane
            .get_available_revision(spec.charm_name(MYSQL_COMPONENT), &channel)
        {
            Ok(revision) => revision,
            Err(e) => {
                return StepResult::failed(format!("failed to resolve latest mysql revision: {e}"));
            }
        };

        let upgrade_in_flight = app
            .units
            .iter()
            .any(|unit| unit.workload_phase == "maintenance");
        if app.revision >= latest && !upgrade_in_flight {
            return StepResult::skipped(format!(
                "mysql already at latest revision {}",
                app.revision
            ));
        }
        // An in-flight upgrade with no recorded state was started out of
        // band; resuming it blindly could wedge the cluster.
        if upgrade_in_flight && self.state == UpgradeState::Init {
            warn!("detected mysql upgrade in progress with no persisted state");
            return StepResult::skipped(
                "detected an in-progress mysql upgrade with no recorded state; \
                 complete or roll it back manually before refreshing",
            );
        }

        StepResult::completed()
    }

    fn run(&mut self, status: Option<&ProgressBar>) -> StepResult {
        match self.execute(status) {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Single-step coordinator wrapping the resumable mysql upgrade.
pub struct MysqlUpgradeCoordinator {
    deployment: Deployment,
    manifest: ManifestV1,
    reset_state: bool,
}

impl MysqlUpgradeCoordinator {
    pub fn new(deployment: Deployment, manifest: ManifestV1, reset_state: bool) -> Self {
        Self {
            deployment,
            manifest,
            reset_state,
        }
    }
}

impl UpgradeCoordinator for MysqlUpgradeCoordinator {
    fn build_plan(&self) -> Result<Vec<Box<dyn Step>>, CoreError> {
        Ok(vec![Box::new(MysqlUpgradeStep::new(
            self.deployment.clone(),
            self.manifest.clone(),
            self.reset_state,
        )?)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ResultKind;
    use helmsman_cluster::MemoryStore;
    use helmsman_runtime::{
        ApplicationStatus, ControlPlane, MockPlane, MockProvisioner, PlaneCall, Provisioner,
        UnitStatus,
    };
    use helmsman_schema::{parse_manifest_str, ModelName};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    const FAST: Duration = Duration::from_millis(5);

    fn manifest() -> ManifestV1 {
        parse_manifest_str(
            r#"
manifest_version = 1

[components.mysql]
channel = "8.0/stable"
charm = "mysql-k8s"
"#,
        )
        .unwrap()
    }

    fn unit(name: &str, workload: &str, message: &str) -> UnitStatus {
        UnitStatus {
            name: UnitName::new(name),
            leader: name.ends_with("/0"),
            workload_phase: workload.to_owned(),
            workload_message: message.to_owned(),
            agent_phase: "idle".to_owned(),
        }
    }

    fn mysql_status(revision: u64, scale: u32, phase: &str) -> ApplicationStatus {
        let units = (0..scale)
            .map(|i| unit(&format!("mysql/{i}"), phase, ""))
            .collect();
        ApplicationStatus {
            name: "mysql".to_owned(),
            channel: "8.0/stable".to_owned(),
            revision,
            scale,
            units,
        }
    }

    fn fixtures(plane: Arc<dyn ControlPlane>) -> (Arc<MemoryStore>, Deployment) {
        let store = Arc::new(MemoryStore::new());
        let deployment = Deployment::new(
            Arc::clone(&store) as Arc<dyn ConfigStore>,
            plane,
            Arc::new(MockProvisioner::new()) as Arc<dyn Provisioner>,
            ModelName::new("openstack"),
            ModelName::new("controller"),
        );
        (store, deployment)
    }

    fn step_with_mock(plane: &Arc<MockPlane>) -> (Arc<MemoryStore>, MysqlUpgradeStep) {
        let (store, deployment) = fixtures(Arc::clone(plane) as Arc<dyn ControlPlane>);
        let step = MysqlUpgradeStep::new(deployment, manifest(), false)
            .unwrap()
            .with_poll_interval(FAST);
        (store, step)
    }

    #[test]
    fn target_scale_holds_quorum() {
        assert_eq!(target_scale(1), 3);
        assert_eq!(target_scale(2), 3);
        assert_eq!(target_scale(3), 5);
        assert_eq!(target_scale(5), 7);
    }

    #[test]
    fn upgrade_state_is_totally_ordered() {
        use UpgradeState::*;
        let order = [
            Init,
            OriginalStateRecorded,
            ScaledUp,
            PrecheckDone,
            HighestUnitUpgraded,
            UpgradeResumed,
            UnitsSettled,
            ScaledBack,
        ];
        for window in order.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[test]
    fn upgrade_state_serializes_kebab_case() {
        let json = serde_json::to_string(&UpgradeState::OriginalStateRecorded).unwrap();
        assert_eq!(json, "\"original-state-recorded\"");
        let back: UpgradeState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, UpgradeState::OriginalStateRecorded);
    }

    #[test]
    fn phases_are_noops_at_or_beyond_their_state() {
        let plane = Arc::new(MockPlane::new());
        let model = ModelName::new("openstack");
        plane.set_status(&model, mysql_status(211, 3, "active"));
        let (store, deployment) = fixtures(Arc::clone(&plane) as Arc<dyn ControlPlane>);

        // Persist a run that already scaled up.
        update_config(
            store.as_ref(),
            MYSQL_UPGRADE_STATE_KEY,
            &PersistedUpgradeState {
                state: UpgradeState::ScaledUp,
                original_scale: Some(1),
                original_revision: Some(211),
                updated_at: Utc::now().to_rfc3339(),
            },
        )
        .unwrap();

        let mut step = MysqlUpgradeStep::new(deployment, manifest(), false)
            .unwrap()
            .with_poll_interval(FAST);
        assert_eq!(step.state(), UpgradeState::ScaledUp);

        // Earlier phases are no-ops and issue no control-plane calls.
        step.record_original_state(None).unwrap();
        step.scale_up(None).unwrap();
        assert_eq!(plane.scale_calls("mysql"), 0);
        // State never decreases.
        assert_eq!(step.state(), UpgradeState::ScaledUp);
    }

    #[test]
    fn record_original_state_persists_revision_and_scale() {
        let plane = Arc::new(MockPlane::new());
        let model = ModelName::new("openstack");
        plane.set_status(&model, mysql_status(211, 2, "active"));
        let (store, mut step) = step_with_mock(&plane);

        step.record_original_state(None).unwrap();
        assert_eq!(step.state(), UpgradeState::OriginalStateRecorded);

        let persisted = load_upgrade_state(store.as_ref()).unwrap().unwrap();
        assert_eq!(persisted.state, UpgradeState::OriginalStateRecorded);
        assert_eq!(persisted.original_scale, Some(2));
        assert_eq!(persisted.original_revision, Some(211));
    }

    #[test]
    fn scale_up_targets_next_odd_count() {
        let plane = Arc::new(MockPlane::new());
        let model = ModelName::new("openstack");
        plane.set_status(&model, mysql_status(211, 1, "active"));
        let (_, mut step) = step_with_mock(&plane);

        step.record_original_state(None).unwrap();
        step.scale_up(None).unwrap();
        assert!(plane.calls().contains(&PlaneCall::Scale {
            model: "openstack".to_owned(),
            application: "mysql".to_owned(),
            scale: 3,
        }));
        assert_eq!(step.state(), UpgradeState::ScaledUp);
    }

    #[test]
    fn scale_up_without_recorded_scale_is_an_error() {
        let plane = Arc::new(MockPlane::new());
        let (_, mut step) = step_with_mock(&plane);
        // Skip straight to scale-up without recording anything.
        let result = step.scale_up(None);
        assert!(matches!(result, Err(CoreError::Upgrade(_))));
        assert_eq!(plane.scale_calls("mysql"), 0);
    }

    #[test]
    fn failure_messages_name_the_rollback_revision() {
        let plane = Arc::new(MockPlane::new());
        let model = ModelName::new("openstack");
        plane.set_status(&model, mysql_status(211, 1, "active"));
        let (_, mut step) = step_with_mock(&plane);
        step.record_original_state(None).unwrap();

        // No leader scripted: precheck fails.
        step.scale_up(None).unwrap();
        let err = step.run_precheck(None).unwrap_err();
        assert!(err.to_string().contains("revision 211"), "{err}");
    }

    #[test]
    fn resume_after_crash_issues_no_duplicate_calls() {
        let plane = Arc::new(MockPlane::new());
        let model = ModelName::new("openstack");
        plane.set_status(&model, mysql_status(211, 3, "active"));
        let (store, deployment) = fixtures(Arc::clone(&plane) as Arc<dyn ControlPlane>);

        update_config(
            store.as_ref(),
            MYSQL_UPGRADE_STATE_KEY,
            &PersistedUpgradeState {
                state: UpgradeState::ScaledUp,
                original_scale: Some(2),
                original_revision: Some(211),
                updated_at: Utc::now().to_rfc3339(),
            },
        )
        .unwrap();

        let mut step = MysqlUpgradeStep::new(deployment, manifest(), false)
            .unwrap()
            .with_poll_interval(FAST);
        step.scale_up(None).unwrap();
        assert_eq!(plane.scale_calls("mysql"), 0);
    }

    #[test]
    fn reset_flag_discards_persisted_state() {
        let plane = Arc::new(MockPlane::new());
        let (store, deployment) = fixtures(Arc::clone(&plane) as Arc<dyn ControlPlane>);
        update_config(
            store.as_ref(),
            MYSQL_UPGRADE_STATE_KEY,
            &PersistedUpgradeState {
                state: UpgradeState::UnitsSettled,
                original_scale: Some(3),
                original_revision: Some(200),
                updated_at: Utc::now().to_rfc3339(),
            },
        )
        .unwrap();

        let step = MysqlUpgradeStep::new(deployment, manifest(), true).unwrap();
        assert_eq!(step.state(), UpgradeState::Init);
        assert!(load_upgrade_state(store.as_ref()).unwrap().is_none());
    }

    #[test]
    fn is_skip_covers_the_usual_outs() {
        let model = ModelName::new("openstack");

        // Not deployed.
        let plane = Arc::new(MockPlane::new());
        let (_, mut step) = step_with_mock(&plane);
        assert_eq!(step.is_skip(None).kind, ResultKind::Skipped);

        // Already at the latest revision.
        let plane = Arc::new(MockPlane::new());
        plane.set_status(&model, mysql_status(240, 3, "active"));
        plane.set_available_revision("mysql-k8s", "8.0/stable", 240);
        let (_, mut step) = step_with_mock(&plane);
        assert_eq!(step.is_skip(None).kind, ResultKind::Skipped);

        // Newer revision available: proceed.
        let plane = Arc::new(MockPlane::new());
        plane.set_status(&model, mysql_status(211, 3, "active"));
        plane.set_available_revision("mysql-k8s", "8.0/stable", 240);
        let (_, mut step) = step_with_mock(&plane);
        assert_eq!(step.is_skip(None).kind, ResultKind::Completed);
    }

    #[test]
    fn is_skip_respects_manifest_pin_and_track() {
        let model = ModelName::new("openstack");
        let plane = Arc::new(MockPlane::new());
        plane.set_status(&model, mysql_status(211, 3, "active"));
        let (_, deployment) = fixtures(Arc::clone(&plane) as Arc<dyn ControlPlane>);

        let pinned = parse_manifest_str(
            "manifest_version = 1\n\n[components.mysql]\nchannel = \"8.0/stable\"\nrevision = 211\n",
        )
        .unwrap();
        let mut step = MysqlUpgradeStep::new(deployment.clone(), pinned, false).unwrap();
        assert_eq!(step.is_skip(None).kind, ResultKind::Skipped);

        let other_track = parse_manifest_str(
            "manifest_version = 1\n\n[components.mysql]\nchannel = \"9.0/stable\"\n",
        )
        .unwrap();
        let mut step = MysqlUpgradeStep::new(deployment, other_track, false).unwrap();
        assert_eq!(step.is_skip(None).kind, ResultKind::Skipped);
    }

    #[test]
    fn is_skip_flags_out_of_band_upgrade() {
        let model = ModelName::new("openstack");
        let plane = Arc::new(MockPlane::new());
        let mut status = mysql_status(211, 3, "active");
        status.units[2] = unit("mysql/2", "maintenance", "upgrade in progress");
        plane.set_status(&model, status);
        plane.set_available_revision("mysql-k8s", "8.0/stable", 240);

        let (_, mut step) = step_with_mock(&plane);
        let result = step.is_skip(None);
        assert_eq!(result.kind, ResultKind::Skipped);
        assert!(result.message().contains("no recorded state"));
    }

    /// Stateful simulation of the control plane reacting to upgrade calls,
    /// so the whole state machine can run end to end deterministically.
    struct SimPlane {
        state: Mutex<SimState>,
    }

    struct SimState {
        scale: u32,
        revision: u64,
        highest_refreshed: bool,
        resumed: bool,
        scale_calls: Vec<u32>,
        actions: Vec<String>,
    }

    impl SimPlane {
        fn new(scale: u32, revision: u64) -> Self {
            Self {
                state: Mutex::new(SimState {
                    scale,
                    revision,
                    highest_refreshed: false,
                    resumed: false,
                    scale_calls: Vec::new(),
                    actions: Vec::new(),
                }),
            }
        }
    }

    impl ControlPlane for SimPlane {
        fn get_application_status(
            &self,
            _model: &ModelName,
            application: &str,
        ) -> Result<ApplicationStatus, helmsman_runtime::PlaneError> {
            let state = self.state.lock().expect("sim lock");
            let units = (0..state.scale)
                .map(|i| {
                    let name = format!("{application}/{i}");
                    let is_highest = i == state.scale - 1;
                    if state.highest_refreshed && !state.resumed && is_highest {
                        unit(&name, "maintenance", "upgrade completed")
                    } else {
                        unit(&name, "active", "")
                    }
                })
                .collect();
            Ok(ApplicationStatus {
                name: application.to_owned(),
                channel: "8.0/stable".to_owned(),
                revision: state.revision,
                scale: state.scale,
                units,
            })
        }

        fn run_action(
            &self,
            _model: &ModelName,
            _unit: &UnitName,
            action: &str,
            _params: &Value,
        ) -> Result<Value, helmsman_runtime::PlaneError> {
            let mut state = self.state.lock().expect("sim lock");
            state.actions.push(action.to_owned());
            if action == "resume-upgrade" {
                state.resumed = true;
                state.revision = 240;
            }
            Ok(serde_json::json!({}))
        }

        fn scale_application(
            &self,
            _model: &ModelName,
            _application: &str,
            scale: u32,
        ) -> Result<(), helmsman_runtime::PlaneError> {
            let mut state = self.state.lock().expect("sim lock");
            state.scale_calls.push(scale);
            state.scale = scale;
            Ok(())
        }

        fn refresh_charm(
            &self,
            _model: &ModelName,
            _application: &str,
            _channel: Option<&str>,
            _revision: Option<u64>,
        ) -> Result<(), helmsman_runtime::PlaneError> {
            self.state.lock().expect("sim lock").highest_refreshed = true;
            Ok(())
        }

        fn get_leader_unit(
            &self,
            _model: &ModelName,
            application: &str,
        ) -> Result<UnitName, helmsman_runtime::PlaneError> {
            Ok(UnitName::new(format!("{application}/0")))
        }

        fn get_available_revision(
            &self,
            _charm: &str,
            _channel: &str,
        ) -> Result<u64, helmsman_runtime::PlaneError> {
            Ok(240)
        }
    }

    #[test]
    fn full_upgrade_runs_end_to_end() {
        let plane = Arc::new(SimPlane::new(1, 211));
        let (store, deployment) = fixtures(Arc::clone(&plane) as Arc<dyn ControlPlane>);

        let mut step = MysqlUpgradeStep::new(deployment, manifest(), false)
            .unwrap()
            .with_poll_interval(FAST);
        assert_eq!(step.is_skip(None).kind, ResultKind::Completed);
        let result = step.run(None);
        assert_eq!(result.kind, ResultKind::Completed, "{:?}", result.message);

        assert_eq!(step.state(), UpgradeState::ScaledBack);
        let persisted = load_upgrade_state(store.as_ref()).unwrap().unwrap();
        assert_eq!(persisted.state, UpgradeState::ScaledBack);
        assert_eq!(persisted.original_scale, Some(1));
        assert_eq!(persisted.original_revision, Some(211));

        let state = plane.state.lock().expect("sim lock");
        // Scaled up to 3 for the upgrade, back to 1 afterwards.
        assert_eq!(state.scale_calls, vec![3, 1]);
        assert_eq!(
            state.actions,
            vec!["pre-upgrade-check".to_owned(), "resume-upgrade".to_owned()]
        );
        assert_eq!(state.revision, 240);
    }
}
