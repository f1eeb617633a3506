//! What happens when a task panics.
//!
//! By default a panic unwinds out of the consumer thread and ends the run loop:
//! no further task runs, queued tasks are dropped and synchronous callers are
//! released with a panic of their own. [`FaultPolicy::Isolate`] instead catches
//! the panic at the task boundary, reports it and keeps the loop alive.

use crate::task::TaskInfo;

use std::any::Any;
use tracing::error;

/// Fault report sink: `(task, panic message)`.
pub type FaultFn = dyn Fn(&TaskInfo, &str) + Send + Sync;

/// How the consumer thread treats a panicking task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Let the panic terminate the consumer thread.
    #[default]
    Propagate,
    /// Catch the panic, report it and continue with the next task.
    Isolate,
}

/// Fault sink used when none is configured: an `error` level event.
pub fn log_fault(task: &TaskInfo, message: &str) {
    error!(
        target: "runloop::fault",
        label = task.label(),
        task = %task,
        message,
        "task panicked"
    );
}

/// Best-effort extraction of a panic payload's message.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
