//! Variable reconciliation: computing desired provisioning state from
//! layered sources and converging the provisioning engine on it.

use crate::CoreError;
use helmsman_cluster::{read_config, update_config, ClusterError, ConfigStore};
use helmsman_runtime::Provisioner;
use helmsman_schema::ManifestV1;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Config Store key holding a plan's persisted variable set.
pub fn plan_config_key(plan: &str) -> String {
    format!("terraform-vars-{plan}")
}

/// Computes and persists desired provisioning variables, then drives the
/// provisioning engine to converge on them.
pub struct Reconciler<'a> {
    store: &'a dyn ConfigStore,
    provisioner: &'a dyn Provisioner,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn ConfigStore, provisioner: &'a dyn Provisioner) -> Self {
        Self { store, provisioner }
    }

    /// Reconcile the variable set stored under `config_key` for `plan_name`.
    ///
    /// Sources, lowest to highest precedence: the plan's manifest defaults,
    /// the previously persisted map, per-component manifest contributions
    /// (components no longer declared contribute nothing), and
    /// `overrides`. Persisted keys derivable from none of the other sources
    /// are dropped unless listed in the plan's preserve set. Overrides
    /// replace structured values wholesale, never merging recursively.
    ///
    /// The result is persisted *before* the provisioning apply, so a failed
    /// apply leaves the updated map in place and a retry converges from
    /// there (at-least-once semantics).
    pub fn reconcile(
        &self,
        config_key: &str,
        manifest: &ManifestV1,
        plan_name: &str,
        overrides: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, CoreError> {
        let plan = manifest
            .plan(plan_name)
            .ok_or_else(|| CoreError::UnknownPlan(plan_name.to_owned()))?;

        let previous: BTreeMap<String, Value> = match read_config(self.store, config_key) {
            Ok(vars) => vars,
            Err(ClusterError::NotFound(_)) => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        let contributions = manifest.contributions(plan_name);

        let mut variables = plan.defaults.clone();
        for (key, value) in &previous {
            let derivable = variables.contains_key(key)
                || contributions.contains_key(key)
                || overrides.contains_key(key);
            if derivable || plan.preserve.iter().any(|p| p == key) {
                variables.insert(key.clone(), value.clone());
            } else {
                debug!("dropping stale variable '{key}' from {config_key}");
            }
        }
        variables.extend(contributions);
        for (key, value) in overrides {
            variables.insert(key.clone(), value.clone());
        }

        update_config(self.store, config_key, &variables)?;

        self.provisioner.write_variables(&variables)?;
        self.provisioner.apply()?;

        Ok(variables)
    }
}
