use crate::result::StepResult;
use crate::CoreError;
use indicatif::ProgressBar;

/// A single unit of orchestration work.
///
/// Steps are constructed with their dependencies injected, executed once by
/// the plan runtime, and discarded. State never survives a plan execution
/// except through the Config Store.
pub trait Step {
    fn name(&self) -> &str;

    /// One-line description shown while the step runs.
    fn description(&self) -> &str;

    /// Decide whether the step's effect is already satisfied. Side-effect
    /// free besides caching lookups `run` will reuse.
    ///
    /// Returns `Skipped` when there is nothing to do, `Completed` to
    /// proceed to `run`, or `Failed` to abort the whole plan (a missing
    /// prerequisite is a failure, not a silent skip).
    fn is_skip(&mut self, status: Option<&ProgressBar>) -> StepResult {
        let _ = status;
        StepResult::completed()
    }

    /// Whether the step needs interactive input.
    fn has_prompts(&self) -> bool {
        false
    }

    /// Gather interactive input. Only invoked when running interactively
    /// and `has_prompts()` is true; steps must fall back to defaults or
    /// manifest values when this is never called.
    fn prompt(&mut self, accept_defaults: bool) -> Result<(), CoreError> {
        let _ = accept_defaults;
        Ok(())
    }

    /// Perform the step's effect. Returns `Completed` or `Failed`, never
    /// `Skipped`.
    fn run(&mut self, status: Option<&ProgressBar>) -> StepResult;
}
