use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported manifest_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("component '{0}' declares an empty channel")]
    EmptyChannel(String),
    #[error("plan '{plan}' references undeclared component '{component}'")]
    UnknownComponent { plan: String, component: String },
}

/// Where a component's workload runs, which decides how convergence is
/// observed: k8s components settle on workload status, machine components
/// on agent status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    #[default]
    K8s,
    Machine,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ComponentSpec {
    #[serde(default)]
    pub kind: ComponentKind,
    /// Charm channel the component tracks, `<track>/<risk>` (e.g. `8.0/stable`).
    pub channel: String,
    /// Pin to an exact charm revision. Pinned components are never refreshed
    /// past this revision by the upgrade coordinators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    /// Charm name when it differs from the component name
    /// (e.g. component `mysql` backed by charm `mysql-k8s`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charm: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, serde_json::Value>,
}

impl ComponentSpec {
    /// The track part of the channel (`8.0` for `8.0/stable`).
    pub fn track(&self) -> &str {
        self.channel.split('/').next().unwrap_or("")
    }

    /// The charm backing this component.
    pub fn charm_name<'a>(&'a self, component: &'a str) -> &'a str {
        self.charm.as_deref().unwrap_or(component)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PlanSpec {
    /// Components whose channel/revision/config feed this plan's variables.
    #[serde(default)]
    pub components: Vec<String>,
    /// Lowest-precedence variable values.
    #[serde(default)]
    pub defaults: BTreeMap<String, serde_json::Value>,
    /// Persisted variable keys that survive reconciliation even when no
    /// longer derivable from the manifest (operator-entered values).
    #[serde(default)]
    pub preserve: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ManifestV1 {
    pub manifest_version: u32,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentSpec>,
    #[serde(default)]
    pub plans: BTreeMap<String, PlanSpec>,
}

impl ManifestV1 {
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.manifest_version != 1 {
            return Err(ManifestError::UnsupportedVersion(self.manifest_version));
        }
        for (name, spec) in &self.components {
            if spec.channel.is_empty() {
                return Err(ManifestError::EmptyChannel(name.clone()));
            }
        }
        for (plan, spec) in &self.plans {
            for component in &spec.components {
                if !self.components.contains_key(component) {
                    return Err(ManifestError::UnknownComponent {
                        plan: plan.clone(),
                        component: component.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn component(&self, name: &str) -> Option<&ComponentSpec> {
        self.components.get(name)
    }

    pub fn plan(&self, name: &str) -> Option<&PlanSpec> {
        self.plans.get(name)
    }

    /// Variable contributions a plan's declared components make, keyed by the
    /// `<component>-channel` / `<component>-revision` / `<component>-config`
    /// convention. Components listed in the plan but no longer declared in
    /// the manifest contribute nothing.
    pub fn contributions(&self, plan: &str) -> BTreeMap<String, serde_json::Value> {
        let mut vars = BTreeMap::new();
        let Some(plan_spec) = self.plans.get(plan) else {
            return vars;
        };
        for component in &plan_spec.components {
            let Some(spec) = self.components.get(component) else {
                continue;
            };
            vars.insert(
                format!("{component}-channel"),
                serde_json::Value::String(spec.channel.clone()),
            );
            if let Some(revision) = spec.revision {
                vars.insert(format!("{component}-revision"), revision.into());
            }
            if !spec.config.is_empty() {
                let config: serde_json::Map<String, serde_json::Value> = spec
                    .config
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                vars.insert(
                    format!("{component}-config"),
                    serde_json::Value::Object(config),
                );
            }
        }
        vars
    }

    /// Components of a plan that are still declared in the manifest, with
    /// their specs.
    pub fn plan_components(&self, plan: &str) -> Vec<(String, &ComponentSpec)> {
        let Some(plan_spec) = self.plans.get(plan) else {
            return Vec::new();
        };
        plan_spec
            .components
            .iter()
            .filter_map(|name| self.components.get(name).map(|spec| (name.clone(), spec)))
            .collect()
    }
}

pub fn parse_manifest_str(content: &str) -> Result<ManifestV1, ManifestError> {
    let manifest: ManifestV1 = toml::from_str(content)?;
    manifest.validate()?;
    Ok(manifest)
}

pub fn parse_manifest_file(path: &Path) -> Result<ManifestV1, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}
