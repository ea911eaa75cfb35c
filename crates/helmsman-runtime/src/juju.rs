use crate::plane::{ApplicationStatus, ControlPlane, UnitStatus};
use crate::PlaneError;
use helmsman_schema::{ModelName, UnitName};
use serde_json::Value;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Control plane handle backed by the `juju` CLI.
///
/// Status and charm metadata are read with `--format json`; mutations go
/// through `juju refresh`, `juju scale-application`, and `juju run`.
pub struct JujuCliPlane {
    binary: PathBuf,
}

impl Default for JujuCliPlane {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("juju"),
        }
    }
}

impl JujuCliPlane {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    fn run(&self, args: &[&str]) -> Result<String, PlaneError> {
        debug!("juju {}", args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| PlaneError::Unavailable(format!("failed to execute juju: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlaneError::Unavailable(format!(
                "juju {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_json(&self, args: &[&str]) -> Result<Value, PlaneError> {
        let stdout = self.run(args)?;
        serde_json::from_str(&stdout)
            .map_err(|e| PlaneError::Unavailable(format!("unparseable juju output: {e}")))
    }
}

fn parse_unit(name: &str, unit: &Value) -> UnitStatus {
    UnitStatus {
        name: UnitName::new(name),
        leader: unit["leader"].as_bool().unwrap_or(false),
        workload_phase: unit["workload-status"]["current"]
            .as_str()
            .unwrap_or("unknown")
            .to_owned(),
        workload_message: unit["workload-status"]["message"]
            .as_str()
            .unwrap_or("")
            .to_owned(),
        agent_phase: unit["juju-status"]["current"]
            .as_str()
            .unwrap_or("unknown")
            .to_owned(),
    }
}

fn parse_application(name: &str, app: &Value) -> ApplicationStatus {
    let units: Vec<UnitStatus> = app["units"]
        .as_object()
        .map(|units| {
            units
                .iter()
                .map(|(unit_name, unit)| parse_unit(unit_name, unit))
                .collect()
        })
        .unwrap_or_default();
    ApplicationStatus {
        name: name.to_owned(),
        channel: app["charm-channel"].as_str().unwrap_or("").to_owned(),
        revision: app["charm-rev"].as_u64().unwrap_or(0),
        scale: app["scale"].as_u64().unwrap_or(units.len() as u64) as u32,
        units,
    }
}

/// Pull the published revision for `channel` out of `juju info` output.
/// Channels come as `<track>/<risk>`; a bare track means `stable`.
fn published_revision(info: &Value, channel: &str) -> Option<u64> {
    let mut parts = channel.splitn(2, '/');
    let track = parts.next()?;
    let risk = parts.next().unwrap_or("stable");
    let released = &info["channels"][track][risk];
    match released {
        Value::Array(entries) => entries.first()?["revision"].as_u64(),
        Value::Object(entry) => entry.get("revision")?.as_u64(),
        _ => None,
    }
}

impl ControlPlane for JujuCliPlane {
    fn get_application_status(
        &self,
        model: &ModelName,
        application: &str,
    ) -> Result<ApplicationStatus, PlaneError> {
        let status =
            self.run_json(&["status", "--model", model.as_str(), "--format", "json"])?;
        let app = &status["applications"][application];
        if app.is_null() {
            return Err(PlaneError::ApplicationNotFound(application.to_owned()));
        }
        Ok(parse_application(application, app))
    }

    fn run_action(
        &self,
        model: &ModelName,
        unit: &UnitName,
        action: &str,
        params: &Value,
    ) -> Result<Value, PlaneError> {
        let mut args: Vec<String> = vec![
            "run".to_owned(),
            "--model".to_owned(),
            model.to_string(),
            "--format".to_owned(),
            "json".to_owned(),
            unit.to_string(),
            action.to_owned(),
        ];
        if let Some(params) = params.as_object() {
            for (key, value) in params {
                args.push(format!("{key}={value}"));
            }
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_json(&arg_refs)?;
        // Output maps unit name to its action result.
        let result = &output[unit.as_str()];
        if result["status"].as_str() == Some("failed") {
            return Err(PlaneError::ActionFailed {
                unit: unit.to_string(),
                action: action.to_owned(),
                message: result["message"].as_str().unwrap_or("").to_owned(),
            });
        }
        Ok(result["results"].clone())
    }

    fn scale_application(
        &self,
        model: &ModelName,
        application: &str,
        scale: u32,
    ) -> Result<(), PlaneError> {
        let scale = scale.to_string();
        self.run(&[
            "scale-application",
            "--model",
            model.as_str(),
            application,
            &scale,
        ])?;
        Ok(())
    }

    fn refresh_charm(
        &self,
        model: &ModelName,
        application: &str,
        channel: Option<&str>,
        revision: Option<u64>,
    ) -> Result<(), PlaneError> {
        let mut args = vec![
            "refresh".to_owned(),
            application.to_owned(),
            "--model".to_owned(),
            model.to_string(),
        ];
        if let Some(channel) = channel {
            args.push("--channel".to_owned());
            args.push(channel.to_owned());
        }
        if let Some(revision) = revision {
            args.push("--revision".to_owned());
            args.push(revision.to_string());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&arg_refs)?;
        Ok(())
    }

    fn get_leader_unit(
        &self,
        model: &ModelName,
        application: &str,
    ) -> Result<UnitName, PlaneError> {
        let status = self.get_application_status(model, application)?;
        status
            .units
            .iter()
            .find(|unit| unit.leader)
            .map(|unit| unit.name.clone())
            .ok_or_else(|| PlaneError::LeaderNotFound(application.to_owned()))
    }

    fn get_available_revision(&self, charm: &str, channel: &str) -> Result<u64, PlaneError> {
        let info = self.run_json(&["info", charm, "--format", "json"])?;
        published_revision(&info, channel).ok_or_else(|| {
            PlaneError::Unavailable(format!(
                "no revision published for charm '{charm}' in channel '{channel}'"
            ))
        })
    }
}
