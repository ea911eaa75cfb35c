use crate::ProvisionError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, error};

pub const TFVARS_FILE: &str = "terraform.tfvars.json";

/// Handle to the infrastructure-as-code provisioning engine.
pub trait Provisioner: Send + Sync {
    /// Write the variable set the next `apply` will consume.
    fn write_variables(&self, variables: &BTreeMap<String, Value>) -> Result<(), ProvisionError>;

    /// Converge infrastructure to the declared state. Blocks for the
    /// duration of the external apply.
    fn apply(&self) -> Result<(), ProvisionError>;

    fn output(&self) -> Result<BTreeMap<String, Value>, ProvisionError>;

    fn destroy(&self) -> Result<(), ProvisionError>;
}

/// Provisioner backed by the `terraform` binary running against a plan
/// directory.
pub struct TerraformEngine {
    plan_dir: PathBuf,
    binary: PathBuf,
    env: BTreeMap<String, String>,
}

impl TerraformEngine {
    pub fn new(plan_dir: impl Into<PathBuf>) -> Self {
        Self {
            plan_dir: plan_dir.into(),
            binary: PathBuf::from("terraform"),
            env: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    fn run(&self, args: &[&str]) -> Result<String, ProvisionError> {
        debug!("terraform {} in {}", args.join(" "), self.plan_dir.display());
        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.plan_dir)
            .envs(&self.env)
            .output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("terraform {} failed: {}", args.join(" "), stderr.trim());
            return Err(ProvisionError::Execution {
                command: (*args.first().unwrap_or(&"")).to_owned(),
                message: stderr.trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Flatten `terraform output -json` into name → value.
fn parse_outputs(raw: &str) -> Result<BTreeMap<String, Value>, ProvisionError> {
    let parsed: BTreeMap<String, Value> =
        serde_json::from_str(raw).map_err(|e| ProvisionError::Output(e.to_string()))?;
    Ok(parsed
        .into_iter()
        .map(|(name, entry)| {
            let value = entry.get("value").cloned().unwrap_or(entry);
            (name, value)
        })
        .collect())
}

impl Provisioner for TerraformEngine {
    fn write_variables(&self, variables: &BTreeMap<String, Value>) -> Result<(), ProvisionError> {
        let content = serde_json::to_string_pretty(variables)?;
        let mut tmp = NamedTempFile::new_in(&self.plan_dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.plan_dir.join(TFVARS_FILE))
            .map_err(|e| ProvisionError::Io(e.error))?;
        Ok(())
    }

    fn apply(&self) -> Result<(), ProvisionError> {
        self.run(&["apply", "-auto-approve", "-input=false", "-no-color"])?;
        Ok(())
    }

    fn output(&self) -> Result<BTreeMap<String, Value>, ProvisionError> {
        let raw = self.run(&["output", "-json"])?;
        parse_outputs(&raw)
    }

    fn destroy(&self) -> Result<(), ProvisionError> {
        self.run(&["destroy", "-auto-approve", "-input=false", "-no-color"])?;
        Ok(())
    }
}

/// Recording provisioner for tests: applies succeed (or fail when scripted)
/// without touching any infrastructure.
#[derive(Default)]
pub struct MockProvisioner {
    written: Mutex<Vec<BTreeMap<String, Value>>>,
    applies: Mutex<u32>,
    destroys: Mutex<u32>,
    fail_apply: AtomicBool,
    outputs: Mutex<BTreeMap<String, Value>>,
}

impl MockProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `apply` fail until cleared.
    pub fn set_fail_apply(&self, fail: bool) {
        self.fail_apply.store(fail, Ordering::Relaxed);
    }

    pub fn set_outputs(&self, outputs: BTreeMap<String, Value>) {
        *self.outputs.lock().expect("mock lock") = outputs;
    }

    /// Every variable set written so far, in order.
    pub fn written(&self) -> Vec<BTreeMap<String, Value>> {
        self.written.lock().expect("mock lock").clone()
    }

    pub fn apply_count(&self) -> u32 {
        *self.applies.lock().expect("mock lock")
    }

    pub fn destroy_count(&self) -> u32 {
        *self.destroys.lock().expect("mock lock")
    }
}

impl Provisioner for MockProvisioner {
    fn write_variables(&self, variables: &BTreeMap<String, Value>) -> Result<(), ProvisionError> {
        self.written.lock().expect("mock lock").push(variables.clone());
        Ok(())
    }

    fn apply(&self) -> Result<(), ProvisionError> {
        if self.fail_apply.load(Ordering::Relaxed) {
            return Err(ProvisionError::Execution {
                command: "apply".to_owned(),
                message: "scripted apply failure".to_owned(),
            });
        }
        *self.applies.lock().expect("mock lock") += 1;
        Ok(())
    }

    fn output(&self) -> Result<BTreeMap<String, Value>, ProvisionError> {
        Ok(self.outputs.lock().expect("mock lock").clone())
    }

    fn destroy(&self) -> Result<(), ProvisionError> {
        *self.destroys.lock().expect("mock lock") += 1;
        Ok(())
    }
}
