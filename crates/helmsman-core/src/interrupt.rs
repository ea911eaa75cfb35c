use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Install the Ctrl-C handler. The first interrupt requests a graceful
/// stop, honored by the plan runtime between steps; a second interrupt
/// exits immediately.
pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(1);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        warn!("interrupt received; finishing current step, Ctrl-C again to force exit");
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}
