#![allow(dead_code)]

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::time::Duration;

/// Armed deadline for a test that could block forever
///
/// Dropping it disarms the watchdog thread, which then exits right away.
pub struct Deadline {
    _disarm: Sender<()>,
}

/// Abort the whole test process unless the returned [`Deadline`] is dropped within `limit`
///
/// A deadlocked admission or join barrier never returns, so liveness tests
/// arm one of these instead of hanging the suite.
pub fn abort_after(limit: Duration) -> Deadline {
    let (disarm, armed) = mpsc::channel::<()>();
    std::thread::spawn(move || {
        if matches!(armed.recv_timeout(limit), Err(RecvTimeoutError::Timeout)) {
            eprintln!("throttle test still blocked after {limit:?}, aborting");
            std::process::abort();
        }
    });
    Deadline { _disarm: disarm }
}

/// Route the throttle's tracing output to the test harness
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .with_target(false)
        .try_init();
}
