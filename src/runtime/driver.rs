//! The consumer thread of a run loop.
//!
//! Each core gets exactly one dedicated thread, started when the loop is built
//! and never stopped. It sleeps while both queues are empty and otherwise
//! executes tasks one at a time, dequeuing under the core lock and running the
//! task with the lock released.

use crate::runtime::core::Core;

use std::io;
use std::sync::Arc;
use std::thread;
use tracing::debug;

/// Spawns the consumer thread for `core`.
///
/// # Errors
/// Returns the OS error if the thread cannot be created.
pub(crate) fn start(core: Arc<Core>) -> io::Result<()> {
    thread::Builder::new()
        .name(core.name().to_string())
        .spawn(move || run(&core))?;

    Ok(())
}

fn run(core: &Core) {
    debug!(target: "runloop", runloop = %core.name(), "consumer started");

    let _guard = TerminateOnPanic { core };
    loop {
        let task = core.next_task();
        core.execute(task);
    }
}

/// Marks the core terminated if a task panic unwinds out of the loop.
struct TerminateOnPanic<'a> {
    core: &'a Core,
}

impl Drop for TerminateOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.core.terminate();
        }
    }
}
