//! Run loop core and the handles used to submit work to it.
//!
//! A [`RunLoop`] is a thin handle: a shared reference to the core plus the
//! [`Lane`] its submissions target. Handles are cheap to clone and may be used
//! from any thread; all of them feed the same consumer thread, so every task
//! submitted through any handle of one loop runs with mutual exclusion.

use crate::builder::RunLoopBuilder;
use crate::runtime::fault::{FaultFn, FaultPolicy, panic_message};
use crate::runtime::queue::{DualQueue, Lane};
use crate::task::{Task, TaskInfo};
use crate::watchdog::Watchdog;

use crossbeam::channel;
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, trace, warn};

struct State {
    queue: DualQueue,
    /// Submitted or expected operations that have not completed yet.
    pending: usize,
    /// Set once a panic has unwound out of the consumer thread.
    terminated: bool,
}

/// State shared by every handle of one run loop and by its consumer thread.
pub(crate) struct Core {
    name: String,
    state: Mutex<State>,
    /// Wakes the consumer when work arrives.
    work: Condvar,
    /// Wakes `wait` callers when the pending counter reaches zero.
    drained: Condvar,
    watchdog: Option<Watchdog>,
    fault_policy: FaultPolicy,
    on_fault: Arc<FaultFn>,
}

impl Core {
    pub(crate) fn new(
        name: String,
        watchdog: Option<Watchdog>,
        fault_policy: FaultPolicy,
        on_fault: Arc<FaultFn>,
    ) -> Self {
        Self {
            name,
            state: Mutex::new(State {
                queue: DualQueue::new(),
                pending: 0,
                terminated: false,
            }),
            work: Condvar::new(),
            drained: Condvar::new(),
            watchdog,
            fault_policy,
            on_fault,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Enqueues `task` on `lane` and wakes the consumer. Never blocks on task
    /// execution.
    pub(crate) fn submit(&self, lane: Lane, task: Task) {
        let mut state = self.state.lock();

        if state.terminated {
            drop(state);
            warn!(
                target: "runloop",
                runloop = %self.name,
                label = task.info.label(),
                "run loop terminated, dropping task"
            );
            return;
        }

        trace!(target: "runloop", label = task.info.label(), ?lane, "submit");
        state.queue.push(lane, task);
        state.pending += 1;
        self.work.notify_one();
    }

    /// Blocks until a task is available and pops it, priority first.
    pub(crate) fn next_task(&self) -> Task {
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.queue.pop() {
                return task;
            }
            self.work.wait(&mut state);
        }
    }

    /// Runs one dequeued task on the calling (consumer) thread.
    ///
    /// No core lock is held while the operation runs.
    pub(crate) fn execute(&self, task: Task) {
        let Task {
            op,
            info,
            completion,
        } = task;

        trace!(target: "runloop", label = info.label(), "run");

        if let Some(watchdog) = &self.watchdog {
            watchdog.enter(info.clone());
        }

        match self.fault_policy {
            FaultPolicy::Propagate => op(),
            FaultPolicy::Isolate => {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(op)) {
                    (self.on_fault)(info.as_ref(), panic_message(&*payload));
                }
            }
        }

        if let Some(watchdog) = &self.watchdog {
            watchdog.exit();
        }

        self.complete_one();

        if let Some(completion) = completion {
            let _ = completion.send(());
        }
    }

    /// Marks the loop dead after a panic escaped a task.
    ///
    /// Accounts for the in-flight task, drops everything still queued (which
    /// releases their synchronous callers) and wakes drain waiters.
    pub(crate) fn terminate(&self) {
        if let Some(watchdog) = &self.watchdog {
            watchdog.exit();
        }

        let dropped = {
            let mut state = self.state.lock();
            state.terminated = true;

            let dropped = state.queue.drain();
            state.pending = state.pending.saturating_sub(dropped.len() + 1);
            if state.pending == 0 {
                self.drained.notify_all();
            }
            dropped
        };

        error!(
            target: "runloop",
            runloop = %self.name,
            dropped = dropped.len(),
            "task panicked, run loop terminated"
        );
    }

    pub(crate) fn expecting(&self) {
        self.state.lock().pending += 1;
    }

    /// # Panics
    /// Panics if there is no matching [`Core::expecting`] call outstanding.
    pub(crate) fn done_expecting(&self) {
        let mut state = self.state.lock();
        assert!(
            state.pending > 0,
            "done_expecting called without a matching expecting"
        );
        state.pending -= 1;
        if state.pending == 0 {
            self.drained.notify_all();
        }
    }

    pub(crate) fn wait(&self) {
        let mut state = self.state.lock();
        while state.pending > 0 {
            self.drained.wait(&mut state);
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.state.lock().pending
    }

    pub(crate) fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    fn complete_one(&self) {
        let mut state = self.state.lock();
        state.pending = state.pending.saturating_sub(1);
        if state.pending == 0 {
            self.drained.notify_all();
        }
    }
}

/// Handle to a single-consumer run loop.
///
/// Every operation submitted through a handle (or any handle derived from it)
/// runs on one dedicated consumer thread, one at a time, in FIFO order within
/// its lane. Priority-lane work always runs before normal-lane work that is
/// still waiting, whenever the consumer picks its next task.
///
/// The consumer thread runs for the life of the process; there is no shutdown.
///
/// # Example
/// ```ignore
/// use runloop::{RunLoop, TaskInfo};
///
/// let rl = RunLoop::new();
/// rl.spawn("log", || println!("on the loop"));
///
/// let answer = rl.sync("compute", || 6 * 7);
/// assert_eq!(answer, 42);
///
/// rl.priority().spawn(TaskInfo::new("urgent").with("reason", "demo"), || {});
/// rl.wait();
/// ```
#[derive(Clone)]
pub struct RunLoop {
    core: Arc<Core>,
    lane: Lane,
}

impl RunLoop {
    /// Creates a run loop without a watchdog and starts its consumer thread.
    ///
    /// # Panics
    /// Panics if the consumer thread cannot be spawned. Use
    /// [`RunLoop::builder`] to handle that error instead.
    pub fn new() -> Self {
        match RunLoopBuilder::new().build() {
            Ok(run_loop) => run_loop,
            Err(err) => panic!("failed to start run loop: {err}"),
        }
    }

    /// Returns a builder for configuring a run loop.
    pub fn builder() -> RunLoopBuilder {
        RunLoopBuilder::new()
    }

    pub(crate) fn from_core(core: Arc<Core>) -> Self {
        Self {
            core,
            lane: Lane::Normal,
        }
    }

    /// Submits `op` and returns immediately.
    ///
    /// # Arguments
    /// * `info` - Label and diagnostics reported if the operation hangs or panics
    /// * `op` - The operation to run on the loop
    pub fn spawn<F>(&self, info: impl Into<TaskInfo>, op: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.core.submit(self.lane, Task::new(info.into(), op));
    }

    /// Submits `op` and blocks until it has run, returning its value.
    ///
    /// Anything `op` mutated is visible to the caller once this returns.
    ///
    /// Calling this from a task running on the same loop deadlocks: the
    /// consumer would wait on itself.
    ///
    /// # Panics
    /// Panics if `op` panicked under [`FaultPolicy::Isolate`], or if the loop
    /// terminated before `op` could complete.
    pub fn sync<R, F>(&self, info: impl Into<TaskInfo>, op: F) -> R
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let slot = Arc::new(Mutex::new(None));
        let (done_tx, done_rx) = channel::bounded(1);

        let result = slot.clone();
        let task = Task::new(info.into(), move || {
            *result.lock() = Some(op());
        })
        .with_completion(done_tx);
        let info = task.info.clone();

        self.core.submit(self.lane, task);

        if done_rx.recv().is_err() {
            panic!(
                "run loop `{}` terminated before task `{}` completed",
                self.core.name(),
                info.label()
            );
        }

        match slot.lock().take() {
            Some(value) => value,
            None => panic!("task `{}` panicked on run loop `{}`", info.label(), self.core.name()),
        }
    }

    /// Like [`RunLoop::sync`] for fallible operations: the exact `Result`
    /// produced by `op` is handed back to the caller.
    pub fn sync_e<T, E, F>(&self, info: impl Into<TaskInfo>, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.sync(info, op)
    }

    /// Returns a handle to the same loop that submits to the priority queue.
    pub fn priority(&self) -> RunLoop {
        Self {
            core: self.core.clone(),
            lane: Lane::Priority,
        }
    }

    /// Returns a handle to the same loop that submits to the normal queue.
    pub fn normal(&self) -> RunLoop {
        Self {
            core: self.core.clone(),
            lane: Lane::Normal,
        }
    }

    /// The queue this handle submits to.
    pub fn lane(&self) -> Lane {
        self.lane
    }

    /// Blocks until every submitted and expected operation has completed.
    ///
    /// Submissions made while waiting extend the wait. Must not be called
    /// from a task on the same loop.
    pub fn wait(&self) {
        self.core.wait();
    }

    /// Registers one operation tracked outside the loop, so that
    /// [`RunLoop::wait`] also waits for it. Balance with
    /// [`RunLoop::done_expecting`].
    pub fn expecting(&self) {
        self.core.expecting();
    }

    /// Marks one [`RunLoop::expecting`] operation as done.
    ///
    /// # Panics
    /// Panics if called more often than [`RunLoop::expecting`].
    pub fn done_expecting(&self) {
        self.core.done_expecting();
    }

    /// Number of submitted or expected operations not yet completed.
    pub fn pending(&self) -> usize {
        self.core.pending()
    }

    /// Number of tasks waiting in both queues.
    pub fn queued(&self) -> usize {
        self.core.queued()
    }

    /// Whether a panicking task has ended the consumer thread.
    pub fn is_terminated(&self) -> bool {
        self.core.is_terminated()
    }

    /// The watchdog attached to this loop, if any.
    pub fn watchdog(&self) -> Option<&Watchdog> {
        self.core.watchdog.as_ref()
    }

    /// Name of the loop, also used for its consumer thread.
    pub fn name(&self) -> &str {
        self.core.name()
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLoop")
            .field("name", &self.core.name)
            .field("lane", &self.lane)
            .finish_non_exhaustive()
    }
}
