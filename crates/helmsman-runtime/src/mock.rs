use crate::plane::{ApplicationStatus, ControlPlane};
use crate::PlaneError;
use helmsman_schema::{ModelName, UnitName};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// A mutating call recorded by `MockPlane`, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaneCall {
    Scale {
        model: String,
        application: String,
        scale: u32,
    },
    Refresh {
        model: String,
        application: String,
        channel: Option<String>,
        revision: Option<u64>,
    },
    Action {
        unit: String,
        action: String,
    },
}

type AppKey = (String, String);

/// Scripted control plane for tests and dry runs.
///
/// Application statuses are queues: each `get_application_status` call pops
/// the next scripted status, and the last one is sticky. Mutations are
/// recorded, never acted on.
#[derive(Default)]
pub struct MockPlane {
    apps: Mutex<HashMap<AppKey, VecDeque<ApplicationStatus>>>,
    leaders: Mutex<HashMap<AppKey, UnitName>>,
    revisions: Mutex<HashMap<(String, String), u64>>,
    calls: Mutex<Vec<PlaneCall>>,
}

impl MockPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(model: &ModelName, application: &str) -> AppKey {
        (model.to_string(), application.to_owned())
    }

    /// Replace the scripted status for an application with a single sticky
    /// status.
    pub fn set_status(&self, model: &ModelName, status: ApplicationStatus) {
        let mut apps = self.apps.lock().expect("mock lock");
        let mut queue = VecDeque::new();
        let key = Self::key(model, &status.name);
        queue.push_back(status);
        apps.insert(key, queue);
    }

    /// Append a status to an application's script; statuses are served in
    /// insertion order and the last one repeats.
    pub fn push_status(&self, model: &ModelName, status: ApplicationStatus) {
        let mut apps = self.apps.lock().expect("mock lock");
        let key = Self::key(model, &status.name);
        apps.entry(key).or_default().push_back(status);
    }

    pub fn set_leader(&self, model: &ModelName, application: &str, unit: UnitName) {
        let mut leaders = self.leaders.lock().expect("mock lock");
        leaders.insert(Self::key(model, application), unit);
    }

    pub fn set_available_revision(&self, charm: &str, channel: &str, revision: u64) {
        let mut revisions = self.revisions.lock().expect("mock lock");
        revisions.insert((charm.to_owned(), channel.to_owned()), revision);
    }

    /// All mutating calls made so far, in order.
    pub fn calls(&self) -> Vec<PlaneCall> {
        self.calls.lock().expect("mock lock").clone()
    }

    pub fn scale_calls(&self, application: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, PlaneCall::Scale { application: a, .. } if a == application))
            .count()
    }

    pub fn refresh_calls(&self, application: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, PlaneCall::Refresh { application: a, .. } if a == application))
            .count()
    }

    fn record(&self, call: PlaneCall) {
        self.calls.lock().expect("mock lock").push(call);
    }
}

impl ControlPlane for MockPlane {
    fn get_application_status(
        &self,
        model: &ModelName,
        application: &str,
    ) -> Result<ApplicationStatus, PlaneError> {
        let mut apps = self.apps.lock().expect("mock lock");
        let queue = apps
            .get_mut(&Self::key(model, application))
            .ok_or_else(|| PlaneError::ApplicationNotFound(application.to_owned()))?;
        if queue.len() > 1 {
            Ok(queue.pop_front().expect("non-empty queue"))
        } else {
            queue
                .front()
                .cloned()
                .ok_or_else(|| PlaneError::ApplicationNotFound(application.to_owned()))
        }
    }

    fn run_action(
        &self,
        _model: &ModelName,
        unit: &UnitName,
        action: &str,
        _params: &Value,
    ) -> Result<Value, PlaneError> {
        self.record(PlaneCall::Action {
            unit: unit.to_string(),
            action: action.to_owned(),
        });
        Ok(serde_json::json!({}))
    }

    fn scale_application(
        &self,
        model: &ModelName,
        application: &str,
        scale: u32,
    ) -> Result<(), PlaneError> {
        self.record(PlaneCall::Scale {
            model: model.to_string(),
            application: application.to_owned(),
            scale,
        });
        Ok(())
    }

    fn refresh_charm(
        &self,
        model: &ModelName,
        application: &str,
        channel: Option<&str>,
        revision: Option<u64>,
    ) -> Result<(), PlaneError> {
        self.record(PlaneCall::Refresh {
            model: model.to_string(),
            application: application.to_owned(),
            channel: channel.map(str::to_owned),
            revision,
        });
        Ok(())
    }

    fn get_leader_unit(
        &self,
        model: &ModelName,
        application: &str,
    ) -> Result<UnitName, PlaneError> {
        let leaders = self.leaders.lock().expect("mock lock");
        leaders
            .get(&Self::key(model, application))
            .cloned()
            .ok_or_else(|| PlaneError::LeaderNotFound(application.to_owned()))
    }

    fn get_available_revision(&self, charm: &str, channel: &str) -> Result<u64, PlaneError> {
        let revisions = self.revisions.lock().expect("mock lock");
        revisions
            .get(&(charm.to_owned(), channel.to_owned()))
            .copied()
            .ok_or_else(|| {
                PlaneError::Unavailable(format!(
                    "no scripted revision for charm '{charm}' in channel '{channel}'"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::UnitStatus;

    fn status(name: &str, phase: &str) -> ApplicationStatus {
        ApplicationStatus {
            name: name.to_owned(),
            channel: "8.0/stable".to_owned(),
            revision: 211,
            scale: 1,
            units: vec![UnitStatus {
                name: UnitName::new(format!("{name}/0")),
                leader: true,
                workload_phase: phase.to_owned(),
                workload_message: String::new(),
                agent_phase: "idle".to_owned(),
            }],
        }
    }

    #[test]
    fn unknown_application_is_not_found() {
        let plane = MockPlane::new();
        let model = ModelName::new("openstack");
        assert!(matches!(
            plane.get_application_status(&model, "mysql"),
            Err(PlaneError::ApplicationNotFound(_))
        ));
    }

    #[test]
    fn scripted_statuses_pop_in_order_and_last_sticks() {
        let plane = MockPlane::new();
        let model = ModelName::new("openstack");
        plane.push_status(&model, status("mysql", "maintenance"));
        plane.push_status(&model, status("mysql", "active"));

        let first = plane.get_application_status(&model, "mysql").unwrap();
        assert_eq!(first.units[0].workload_phase, "maintenance");
        let second = plane.get_application_status(&model, "mysql").unwrap();
        assert_eq!(second.units[0].workload_phase, "active");
        let third = plane.get_application_status(&model, "mysql").unwrap();
        assert_eq!(third.units[0].workload_phase, "active");
    }

    #[test]
    fn mutating_calls_are_recorded() {
        let plane = MockPlane::new();
        let model = ModelName::new("openstack");
        plane.scale_application(&model, "mysql", 3).unwrap();
        plane
            .refresh_charm(&model, "mysql", Some("8.0/stable"), None)
            .unwrap();
        assert_eq!(plane.scale_calls("mysql"), 1);
        assert_eq!(plane.refresh_calls("mysql"), 1);
    }
}
