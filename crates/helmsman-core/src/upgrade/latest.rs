//! In-channel refresh: bring every tracked component to the latest charm
//! revision available in its currently-configured channel.

use crate::deployment::Deployment;
use crate::monitor::{wait_until_status_with_interval, DEFAULT_POLL_INTERVAL};
use crate::plan::update_status;
use crate::result::StepResult;
use crate::step::Step;
use crate::upgrade::UpgradeCoordinator;
use crate::CoreError;
use helmsman_runtime::{PhaseSource, PlaneError};
use helmsman_schema::{ComponentKind, ComponentSpec, ManifestV1, ModelName};
use indicatif::ProgressBar;
use std::time::Duration;
use tracing::debug;

const CONTROL_PLANE_REFRESH_TIMEOUT: Duration = Duration::from_secs(2700);
const MACHINE_REFRESH_TIMEOUT: Duration = Duration::from_secs(1800);

// Workloads routinely pass through blocked/unknown while charms restart;
// only error is terminal during a refresh.
const WORKLOAD_TARGETS: &[&str] = &["active", "blocked", "unknown"];
const AGENT_TARGETS: &[&str] = &["idle"];

#[derive(Debug, Clone)]
struct PendingRefresh {
    application: String,
    channel: Option<String>,
    revision: Option<u64>,
}

/// Refresh a group of components to their latest in-channel revision and
/// wait for the group to settle.
pub struct LatestInChannelStep {
    deployment: Deployment,
    components: Vec<(String, ComponentSpec)>,
    model: ModelName,
    source: PhaseSource,
    targets: &'static [&'static str],
    timeout: Duration,
    poll_interval: Duration,
    name: String,
    description: String,
    pending: Vec<PendingRefresh>,
}

impl LatestInChannelStep {
    fn new(
        deployment: Deployment,
        components: Vec<(String, ComponentSpec)>,
        model: ModelName,
        source: PhaseSource,
        targets: &'static [&'static str],
        timeout: Duration,
        group: &str,
    ) -> Self {
        Self {
            deployment,
            components,
            model,
            source,
            targets,
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            name: format!("refresh-{group}"),
            description: format!("Refreshing {group} components to latest in-channel revision"),
            pending: Vec::new(),
        }
    }

    pub fn control_plane(
        deployment: Deployment,
        components: Vec<(String, ComponentSpec)>,
    ) -> Self {
        let model = deployment.control_model.clone();
        Self::new(
            deployment,
            components,
            model,
            PhaseSource::Workload,
            WORKLOAD_TARGETS,
            CONTROL_PLANE_REFRESH_TIMEOUT,
            "control plane",
        )
    }

    pub fn machine(deployment: Deployment, components: Vec<(String, ComponentSpec)>) -> Self {
        let model = deployment.machine_model.clone();
        Self::new(
            deployment,
            components,
            model,
            PhaseSource::Agent,
            AGENT_TARGETS,
            MACHINE_REFRESH_TIMEOUT,
            "machine",
        )
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Step for LatestInChannelStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_skip(&mut self, _status: Option<&ProgressBar>) -> StepResult {
        let mut pending = Vec::new();
        for (name, spec) in &self.components {
            let app = match self
                .deployment
                .plane
                .get_application_status(&self.model, name)
            {
                Ok(app) => app,
                Err(PlaneError::ApplicationNotFound(_)) => {
                    debug!("'{name}' not deployed, nothing to refresh");
                    continue;
                }
                Err(e) => {
                    return StepResult::failed(format!("failed to read status of '{name}': {e}"));
                }
            };

            // A manifest pin always wins over channel resolution.
            if let Some(pinned) = spec.revision {
                if app.revision != pinned {
                    pending.push(PendingRefresh {
                        application: name.clone(),
                        channel: Some(spec.channel.clone()),
                        revision: Some(pinned),
                    });
                }
                continue;
            }

            let channel = if app.channel.is_empty() {
                spec.channel.clone()
            } else {
                app.channel.clone()
            };
            let latest = match self
                .deployment
                .plane
                .get_available_revision(spec.charm_name(name), &channel)
            {
                Ok(revision) => revision,
                Err(e) => {
                    return StepResult::failed(format!(
                        "failed to resolve latest revision of '{name}': {e}"
                    ));
                }
            };
            if app.revision < latest {
                debug!("'{name}' {} -> {latest} in {channel}", app.revision);
                pending.push(PendingRefresh {
                    application: name.clone(),
                    channel: None,
                    revision: None,
                });
            }
        }

        if pending.is_empty() {
            return StepResult::skipped("all components already at the latest in-channel revision");
        }
        self.pending = pending;
        StepResult::completed()
    }

    fn run(&mut self, status: Option<&ProgressBar>) -> StepResult {
        let applications: Vec<String> = self
            .pending
            .iter()
            .map(|refresh| refresh.application.clone())
            .collect();

        for refresh in &self.pending {
            update_status(status, &format!("Refreshing {}...", refresh.application));
            if let Err(e) = self.deployment.plane.refresh_charm(
                &self.model,
                &refresh.application,
                refresh.channel.as_deref(),
                refresh.revision,
            ) {
                return StepResult::failed(format!(
                    "charm refresh failed for '{}': {e}",
                    refresh.application
                ));
            }
        }

        update_status(status, "Waiting for refreshed components to settle...");
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

/// Refresh every tracked component to the latest revision in its channel:
/// control-plane components first, machine components second.
pub struct LatestInChannelCoordinator {
    deployment: Deployment,
    manifest: ManifestV1,
}

impl LatestInChannelCoordinator {
    pub fn new(deployment: Deployment, manifest: ManifestV1) -> Self {
        Self {
            deployment,
            manifest,
        }
    }
}

impl UpgradeCoordinator for LatestInChannelCoordinator {
    fn build_plan(&self) -> Result<Vec<Box<dyn Step>>, CoreError> {
        let mut control = Vec::new();
        let mut machine = Vec::new();
        for (name, spec) in &self.manifest.components {
            match spec.kind {
                ComponentKind::K8s => control.push((name.clone(), spec.clone())),
                ComponentKind::Machine => machine.push((name.clone(), spec.clone())),
            }
        }

        let mut steps: Vec<Box<dyn Step>> = Vec::new();
        if !control.is_empty() {
            steps.push(Box::new(LatestInChannelStep::control_plane(
                self.deployment.clone(),
                control,
            )));
        }
        if !machine.is_empty() {
            steps.push(Box::new(LatestInChannelStep::machine(
                self.deployment.clone(),
                machine,
            )));
        }
        Ok(steps)
    }
}
