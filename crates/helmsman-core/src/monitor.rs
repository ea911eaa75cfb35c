//! Background status monitoring for long-running convergence operations.
//!
//! A `StatusMonitor` is a polling thread that observes the control plane
//! and never mutates it. Snapshots flow to the caller over a bounded
//! channel and are drained on the same call stack as the blocking wait;
//! the change callback drives the console. Stopping is idempotent and also
//! happens on drop, so the monitor cannot outlive its wait.

use crate::CoreError;
use helmsman_runtime::{ControlPlane, PhaseSource, PlaneError};
use helmsman_schema::ModelName;
use indicatif::ProgressBar;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::debug;

/// Point-in-time component → phase map. Not persisted.
pub type StatusSnapshot = BTreeMap<String, String>;

/// Workload phase treated as terminal: a component reporting it will never
/// reach a target phase without intervention.
const ERROR_PHASE: &str = "error";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

enum MonitorEvent {
    Snapshot(StatusSnapshot),
    Failed(PlaneError),
}

pub struct StatusMonitor {
    components: Vec<String>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    events: Receiver<MonitorEvent>,
}

impl StatusMonitor {
    /// Start polling the named components. `on_change` fires whenever the
    /// snapshot differs from the previous one; every poll also offers the
    /// snapshot to the wait channel. Polling is eventually consistent: a
    /// missed intermediate phase is acceptable, only the final phase
    /// matters.
    pub fn start(
        plane: Arc<dyn ControlPlane>,
        model: &ModelName,
        components: &[String],
        source: PhaseSource,
        poll_interval: Duration,
        on_change: impl Fn(&StatusSnapshot) + Send + 'static,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        // Bounded to the component count; when the consumer lags, stale
        // snapshots are dropped and the next poll re-offers fresh state.
        let (tx, rx) = sync_channel(components.len().max(1));

        let thread = {
            let stop = Arc::clone(&stop);
            let model = model.clone();
            let components = components.to_vec();
            std::thread::spawn(move || {
                poll_loop(&plane, &model, &components, source, poll_interval, &stop, &tx, on_change);
            })
        };

        Self {
            components: components.to_vec(),
            stop,
            thread: Some(thread),
            events: rx,
        }
    }

    /// Block until every monitored component reaches one of
    /// `target_phases`.
    ///
    /// Fails with `Timeout` once `timeout` elapses, with `Wait` as soon as
    /// any component reports the terminal error phase, and with the
    /// underlying control-plane error if status polling itself fails.
    pub fn wait_until(
        &self,
        target_phases: &[&str],
        timeout: Duration,
    ) -> Result<StatusSnapshot, CoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Err(self.timeout_error(target_phases));
            };
            match self.events.recv_timeout(remaining) {
                Ok(MonitorEvent::Snapshot(snapshot)) => {
                    let errored: Vec<String> = snapshot
                        .iter()
                        .filter(|(_, phase)| phase.as_str() == ERROR_PHASE)
                        .map(|(component, _)| component.clone())
                        .collect();
                    if !errored.is_empty() {
                        return Err(CoreError::Wait { components: errored });
                    }
                    if !snapshot.is_empty()
                        && snapshot
                            .values()
                            .all(|phase| target_phases.contains(&phase.as_str()))
                    {
                        return Ok(snapshot);
                    }
                }
                Ok(MonitorEvent::Failed(e)) => return Err(e.into()),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(self.timeout_error(target_phases));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CoreError::Monitor(
                        "status monitor stopped before convergence".to_owned(),
                    ));
                }
            }
        }
    }

    fn timeout_error(&self, target_phases: &[&str]) -> CoreError {
        CoreError::Timeout {
            components: self.components.clone(),
            targets: target_phases.iter().map(|p| (*p).to_owned()).collect(),
        }
    }

    /// Cancel the poll loop. Safe to call any number of times and from
    /// cleanup paths.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
fn poll_loop(
    plane: &Arc<dyn ControlPlane>,
    model: &ModelName,
    components: &[String],
    source: PhaseSource,
    poll_interval: Duration,
    stop: &AtomicBool,
    tx: &SyncSender<MonitorEvent>,
    on_change: impl Fn(&StatusSnapshot),
) {
    let mut last: Option<StatusSnapshot> = None;
    while !stop.load(Ordering::Relaxed) {
        let mut snapshot = StatusSnapshot::new();
        for component in components {
            match plane.get_application_status(model, component) {
                Ok(app) => {
                    snapshot.insert(component.clone(), app.aggregate_phase(source));
                }
                Err(e) => {
                    // Blocking send: the failure must reach the consumer
                    // even when the channel holds a stale snapshot.
                    let _ = tx.send(MonitorEvent::Failed(e));
                    return;
                }
            }
        }

        if last.as_ref() != Some(&snapshot) {
            debug!("status changed: {snapshot:?}");
            on_change(&snapshot);
            last = Some(snapshot.clone());
        }
        // Offer every poll, not just changes, so a dropped snapshot can
        // never stall the consumer.
        let _ = tx.try_send(MonitorEvent::Snapshot(snapshot));

        sleep_unless_stopped(stop, poll_interval);
    }
}

fn sleep_unless_stopped(stop: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline && !stop.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(20).min(duration));
    }
}

fn render_snapshot(snapshot: &StatusSnapshot) -> String {
    snapshot
        .iter()
        .map(|(component, phase)| format!("{component}: {phase}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Wait for the named components to reach one of `target_phases`, with a
/// monitor attached for the duration of the wait. The monitor is started
/// before blocking and stopped unconditionally afterwards, whatever the
/// outcome.
pub fn wait_until_status(
    plane: &Arc<dyn ControlPlane>,
    model: &ModelName,
    components: &[String],
    source: PhaseSource,
    target_phases: &[&str],
    timeout: Duration,
    status: Option<&ProgressBar>,
) -> Result<(), CoreError> {
    wait_until_status_with_interval(
        plane,
        model,
        components,
        source,
        target_phases,
        timeout,
        status,
        DEFAULT_POLL_INTERVAL,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn wait_until_status_with_interval(
    plane: &Arc<dyn ControlPlane>,
    model: &ModelName,
    components: &[String],
    source: PhaseSource,
    target_phases: &[&str],
    timeout: Duration,
    status: Option<&ProgressBar>,
    poll_interval: Duration,
) -> Result<(), CoreError> {
    let pb = status.cloned();
    let mut monitor = StatusMonitor::start(
        Arc::clone(plane),
        model,
        components,
        source,
        poll_interval,
        move |snapshot| {
            if let Some(ref pb) = pb {
                pb.set_message(render_snapshot(snapshot));
            }
        },
    );
    let result = monitor.wait_until(target_phases, timeout);
    monitor.stop();
    result.map(|_| ())
}
