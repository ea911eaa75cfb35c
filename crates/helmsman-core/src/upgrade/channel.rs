//! Cross-track ("major") upgrade: switch every component to the channel
//! declared in the manifest, then converge the provisioning plans on the
//! new channels.

use crate::deployment::Deployment;
use crate::monitor::{wait_until_status_with_interval, DEFAULT_POLL_INTERVAL};
use crate::plan::update_status;
use crate::reconcile::{plan_config_key, Reconciler};
use crate::result::StepResult;
use crate::step::Step;
use crate::upgrade::{UpgradeCoordinator, CONTROL_PLANE_PLAN, MACHINE_PLAN};
use crate::CoreError;
use helmsman_runtime::PhaseSource;
use helmsman_schema::{ManifestV1, ModelName};
use indicatif::ProgressBar;
use std::collections::BTreeMap;
use std::time::Duration;

const CONTROL_PLANE_UPGRADE_TIMEOUT: Duration = Duration::from_secs(2700);
const MACHINE_UPGRADE_TIMEOUT: Duration = Duration::from_secs(1800);

const WORKLOAD_TARGETS: &[&str] = &["active", "blocked", "unknown"];
const AGENT_TARGETS: &[&str] = &["idle"];

/// Interactive gate in front of a cross-track upgrade. Channel upgrades
/// cannot be rolled back by refreshing to an older channel, so the operator
/// confirms before anything is touched. Non-interactive runs proceed.
pub struct ConfirmChannelUpgradeStep {
    confirmed: bool,
}

impl Default for ConfirmChannelUpgradeStep {
    fn default() -> Self {
        Self { confirmed: true }
    }
}

impl ConfirmChannelUpgradeStep {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Step for ConfirmChannelUpgradeStep {
    fn name(&self) -> &str {
        "confirm-channel-upgrade"
    }

    fn description(&self) -> &str {
        "Confirming channel upgrade"
    }

    fn has_prompts(&self) -> bool {
        true
    }

    fn prompt(&mut self, accept_defaults: bool) -> Result<(), CoreError> {
        if accept_defaults {
            return Ok(());
        }
        self.confirmed = dialoguer::Confirm::new()
            .with_prompt("Channel upgrades cannot be rolled back. Continue?")
            .default(false)
            .interact()
            .map_err(|e| CoreError::Prompt(e.to_string()))?;
        Ok(())
    }

    fn run(&mut self, _status: Option<&ProgressBar>) -> StepResult {
        if self.confirmed {
            StepResult::completed()
        } else {
            StepResult::failed("channel upgrade cancelled by operator")
        }
    }
}

/// Reconcile one provisioning plan against the manifest (landing the new
/// channels in its variables), apply it, and wait for the plan's
/// components to settle.
pub struct UpgradePlanStep {
    deployment: Deployment,
    manifest: ManifestV1,
    plan_name: String,
    model: ModelName,
    source: PhaseSource,
    targets: &'static [&'static str],
    timeout: Duration,
    poll_interval: Duration,
    name: String,
    description: String,
}

impl UpgradePlanStep {
    fn new(
        deployment: Deployment,
        manifest: ManifestV1,
        plan_name: &str,
        model: ModelName,
        source: PhaseSource,
        targets: &'static [&'static str],
        timeout: Duration,
    ) -> Self {
        Self {
            deployment,
            manifest,
            plan_name: plan_name.to_owned(),
            model,
            source,
            targets,
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            name: format!("upgrade-{plan_name}"),
            description: format!("Upgrading '{plan_name}' components to manifest channels"),
        }
    }

    pub fn control_plane(deployment: Deployment, manifest: ManifestV1) -> Self {
        let model = deployment.control_model.clone();
        Self::new(
            deployment,
            manifest,
            CONTROL_PLANE_PLAN,
            model,
            PhaseSource::Workload,
            WORKLOAD_TARGETS,
            CONTROL_PLANE_UPGRADE_TIMEOUT,
        )
    }

    pub fn machines(deployment: Deployment, manifest: ManifestV1) -> Self {
        let model = deployment.machine_model.clone();
        Self::new(
            deployment,
            manifest,
            MACHINE_PLAN,
            model,
            PhaseSource::Agent,
            AGENT_TARGETS,
            MACHINE_UPGRADE_TIMEOUT,
        )
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Step for UpgradePlanStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_skip(&mut self, _status: Option<&ProgressBar>) -> StepResult {
        if self.manifest.plan(&self.plan_name).is_none() {
            return StepResult::skipped(format!(
                "manifest declares no '{}' plan",
                self.plan_name
            ));
        }
        if self.manifest.plan_components(&self.plan_name).is_empty() {
            return StepResult::skipped(format!(
                "plan '{}' has no declared components",
                self.plan_name
            ));
        }
        StepResult::completed()
    }

    fn run(&mut self, status: Option<&ProgressBar>) -> StepResult {
        update_status(
            status,
            &format!("Applying provisioning plan '{}'...", self.plan_name),
        );
        let reconciler = Reconciler::new(
            self.deployment.store.as_ref(),
            self.deployment.provisioner.as_ref(),
        );
        let config_key = plan_config_key(&self.plan_name);
        if let Err(e) =
            reconciler.reconcile(&config_key, &self.manifest, &self.plan_name, &BTreeMap::new())
        {
            return StepResult::failed(format!(
                "error upgrading plan '{}': {e}",
                self.plan_name
            ));
        }

        let applications: Vec<String> = self
            .manifest
            .plan_components(&self.plan_name)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        update_status(
            status,
            &format!("Waiting for '{}' components to settle...", self.plan_name),
        );
        match wait_until_status_with_interval(
            &self.deployment.plane,
            &self.model,
            &applications,
            self.source,
            self.targets,
            self.timeout,
            status,
            self.poll_interval,
        ) {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Cross-track upgrade: confirm, then reconcile the control-plane plan and
/// the machine plan against the manifest's (new) channels.
pub struct ChannelUpgradeCoordinator {
    deployment: Deployment,
    manifest: ManifestV1,
}

impl ChannelUpgradeCoordinator {
    pub fn new(deployment: Deployment, manifest: ManifestV1) -> Self {
        Self {
            deployment,
            manifest,
        }
    }
}

impl UpgradeCoordinator for ChannelUpgradeCoordinator {
    fn build_plan(&self) -> Result<Vec<Box<dyn Step>>, CoreError> {
        Ok(vec![
            Box::new(ConfirmChannelUpgradeStep::new()),
            Box::new(UpgradePlanStep::control_plane(
                self.deployment.clone(),
                self.manifest.clone(),
            )),
            Box::new(UpgradePlanStep::machines(
                self.deployment.clone(),
                self.manifest.clone(),
            )),
        ])
    }
}
