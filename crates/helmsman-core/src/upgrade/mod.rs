//! Upgrade coordinators: specialized plans implementing the ordered,
//! resumable upgrade protocols.

pub mod channel;
pub mod latest;
pub mod mysql;

pub use channel::ChannelUpgradeCoordinator;
pub use latest::LatestInChannelCoordinator;
pub use mysql::{
    load_upgrade_state, reset_upgrade_state, target_scale, MysqlUpgradeCoordinator,
    MysqlUpgradeStep, UpgradeState, MYSQL_UPGRADE_STATE_KEY,
};

use crate::plan::run_plan;
use crate::result::StepResult;
use crate::step::Step;
use crate::CoreError;

/// Provisioning plan holding the k8s control-plane components.
pub const CONTROL_PLANE_PLAN: &str = "control-plane";
/// Provisioning plan holding the machine components.
pub const MACHINE_PLAN: &str = "machines";

/// An upgrade protocol expressed as a plan of steps.
pub trait UpgradeCoordinator {
    fn build_plan(&self) -> Result<Vec<Box<dyn Step>>, CoreError>;

    /// Build and execute the upgrade plan.
    fn run_plan(&self, interactive: bool, accept_defaults: bool) -> StepResult {
        match self.build_plan() {
            Ok(mut steps) => run_plan(&mut steps, interactive, accept_defaults),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}
