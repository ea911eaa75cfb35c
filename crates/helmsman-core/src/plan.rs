//! Sequential, fail-fast execution of step plans.

use crate::interrupt::shutdown_requested;
use crate::result::{ResultKind, StepResult};
use crate::step::Step;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{debug, warn};

fn step_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(message.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish(pb: &ProgressBar, mark: &str, message: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("{mark} {message}"));
}

/// Update the in-flight status line, when one is attached.
pub fn update_status(status: Option<&ProgressBar>, message: &str) {
    if let Some(pb) = status {
        pb.set_message(message.to_owned());
    }
}

/// Execute `steps` strictly in order.
///
/// For each step: `is_skip` decides whether to skip, proceed, or abort;
/// a `Failed` result from either `is_skip` or `run` aborts the plan
/// immediately and is returned unchanged. The runtime performs no retries
/// and no rollback. A plan that exhausts its steps returns `Completed`.
///
/// `prompt` is only invoked when `interactive` is set and the step declares
/// prompts.
pub fn run_plan(
    steps: &mut [Box<dyn Step>],
    interactive: bool,
    accept_defaults: bool,
) -> StepResult {
    for step in steps.iter_mut() {
        if shutdown_requested() {
            return StepResult::failed("interrupted by user");
        }

        debug!("starting step '{}'", step.name());
        let pb = step_spinner(step.description());

        let skip = step.is_skip(Some(&pb));
        match skip.kind {
            ResultKind::Failed => {
                finish(&pb, "✗", step.description());
                return skip;
            }
            ResultKind::Skipped => {
                debug!("step '{}' skipped: {}", step.name(), skip.message());
                finish(&pb, "-", &format!("{} (skipped)", step.description()));
                continue;
            }
            ResultKind::Completed => {}
        }

        if interactive && step.has_prompts() {
            let prompted = pb.suspend(|| step.prompt(accept_defaults));
            if let Err(e) = prompted {
                finish(&pb, "✗", step.description());
                return StepResult::failed(e.to_string());
            }
        }

        let result = step.run(Some(&pb));
        match result.kind {
            ResultKind::Failed => {
                finish(&pb, "✗", step.description());
                return result;
            }
            ResultKind::Skipped => {
                // Contract violation; treat as completed rather than
                // dropping the rest of the plan.
                warn!("step '{}' returned Skipped from run", step.name());
                finish(&pb, "✓", step.description());
            }
            ResultKind::Completed => {
                finish(&pb, "✓", step.description());
            }
        }
    }
    StepResult::completed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CoreError;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Event {
        IsSkip(usize),
        Prompt(usize),
        Run(usize),
    }

    struct ScriptedStep {
        index: usize,
        skip_result: StepResult,
        run_result: StepResult,
        prompts: bool,
        events: Rc<RefCell<Vec<Event>>>,
    }

    impl ScriptedStep {
        fn new(
            index: usize,
            skip_result: StepResult,
            run_result: StepResult,
            events: &Rc<RefCell<Vec<Event>>>,
        ) -> Box<dyn Step> {
            Box::new(Self {
                index,
                skip_result,
                run_result,
                prompts: false,
                events: Rc::clone(events),
            })
        }
    }

    impl Step for ScriptedStep {
        fn name(&self) -> &str {
            "scripted"
        }

        fn description(&self) -> &str {
            "scripted step"
        }

        fn is_skip(&mut self, _status: Option<&ProgressBar>) -> StepResult {
            self.events.borrow_mut().push(Event::IsSkip(self.index));
            self.skip_result.clone()
        }

        fn has_prompts(&self) -> bool {
            self.prompts
        }

        fn prompt(&mut self, _accept_defaults: bool) -> Result<(), CoreError> {
            self.events.borrow_mut().push(Event::Prompt(self.index));
            Ok(())
        }

        fn run(&mut self, _status: Option<&ProgressBar>) -> StepResult {
            self.events.borrow_mut().push(Event::Run(self.index));
            self.run_result.clone()
        }
    }

    #[test]
    fn all_steps_complete() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut steps = vec![
            ScriptedStep::new(0, StepResult::completed(), StepResult::completed(), &events),
            ScriptedStep::new(1, StepResult::completed(), StepResult::completed(), &events),
        ];
        let result = run_plan(&mut steps, false, false);
        assert_eq!(result.kind, ResultKind::Completed);
        assert_eq!(
            *events.borrow(),
            vec![
                Event::IsSkip(0),
                Event::Run(0),
                Event::IsSkip(1),
                Event::Run(1)
            ]
        );
    }

    #[test]
    fn skipped_step_never_runs() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut steps = vec![
            ScriptedStep::new(
                0,
                StepResult::skipped("already done"),
                StepResult::completed(),
                &events,
            ),
            ScriptedStep::new(1, StepResult::completed(), StepResult::completed(), &events),
        ];
        let result = run_plan(&mut steps, false, false);
        assert_eq!(result.kind, ResultKind::Completed);
        assert_eq!(
            *events.borrow(),
            vec![Event::IsSkip(0), Event::IsSkip(1), Event::Run(1)]
        );
    }

    #[test]
    fn failed_is_skip_aborts_plan_with_message() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut steps = vec![
            ScriptedStep::new(0, StepResult::completed(), StepResult::completed(), &events),
            ScriptedStep::new(
                1,
                StepResult::failed("missing prereq"),
                StepResult::completed(),
                &events,
            ),
            ScriptedStep::new(2, StepResult::completed(), StepResult::completed(), &events),
        ];
        let result = run_plan(&mut steps, false, false);
        assert!(result.is_failed());
        assert_eq!(result.message(), "missing prereq");
        // Step 1 ran, step 3 was never reached.
        assert_eq!(
            *events.borrow(),
            vec![Event::IsSkip(0), Event::Run(0), Event::IsSkip(1)]
        );
    }

    #[test]
    fn failed_run_aborts_remaining_steps() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut steps = vec![
            ScriptedStep::new(
                0,
                StepResult::completed(),
                StepResult::failed("apply failed"),
                &events,
            ),
            ScriptedStep::new(1, StepResult::completed(), StepResult::completed(), &events),
        ];
        let result = run_plan(&mut steps, false, false);
        assert!(result.is_failed());
        assert_eq!(*events.borrow(), vec![Event::IsSkip(0), Event::Run(0)]);
    }

    #[test]
    fn prompts_only_run_interactively() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut step = ScriptedStep {
            index: 0,
            skip_result: StepResult::completed(),
            run_result: StepResult::completed(),
            prompts: true,
            events: Rc::clone(&events),
        };
        let mut steps: Vec<Box<dyn Step>> = vec![Box::new(step)];
        run_plan(&mut steps, false, false);
        assert!(!events.borrow().contains(&Event::Prompt(0)));

        events.borrow_mut().clear();
        step = ScriptedStep {
            index: 0,
            skip_result: StepResult::completed(),
            run_result: StepResult::completed(),
            prompts: true,
            events: Rc::clone(&events),
        };
        steps = vec![Box::new(step)];
        run_plan(&mut steps, true, true);
        assert!(events.borrow().contains(&Event::Prompt(0)));
    }
}
