//! Fluent builder for RunLoop construction.
//!
//! Provides a builder pattern interface for creating and configuring run loops:
//! consumer thread name, optional watchdog, time source and panic policy.

use crate::error::RunLoopError;
use crate::runtime::fault::{FaultFn, FaultPolicy, log_fault};
use crate::runtime::{Core, RunLoop, driver};
use crate::task::{KeyValue, TaskInfo};
use crate::time::{Clock, SystemClock};
use crate::watchdog::{DEFAULT_DIVISIONS, TimeoutFn, Watchdog, log_timeout};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Builder for constructing RunLoop instances with fluent API.
///
/// Without a call to [`RunLoopBuilder::watchdog`] the loop runs unwatched and
/// hangs go undetected.
///
/// # Example
/// ```ignore
/// let rl = RunLoopBuilder::new()
///     .name("state")
///     .watchdog(Duration::from_secs(5))
///     .divisions(4)
///     .on_timeout(|at, label, pairs| eprintln!("{label} hung ({pairs:?}) at {at:?}"))
///     .build()?;
/// ```
pub struct RunLoopBuilder {
    name: String,
    timeout: Option<Duration>,
    divisions: u32,
    on_timeout: Arc<TimeoutFn>,
    clock: Arc<dyn Clock>,
    fault_policy: FaultPolicy,
    on_fault: Arc<FaultFn>,
}

impl Default for RunLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLoopBuilder {
    /// Creates a new run loop builder.
    ///
    /// Defaults: thread name `"runloop"`, no watchdog, [`DEFAULT_DIVISIONS`]
    /// ticks, timeouts and faults reported through `tracing`, system clock,
    /// [`FaultPolicy::Propagate`].
    pub fn new() -> Self {
        Self {
            name: "runloop".to_string(),
            timeout: None,
            divisions: DEFAULT_DIVISIONS,
            on_timeout: Arc::new(log_timeout),
            clock: Arc::new(SystemClock),
            fault_policy: FaultPolicy::default(),
            on_fault: Arc::new(log_fault),
        }
    }

    /// Names the loop and its consumer thread.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enables the watchdog: any task running longer than `timeout` is
    /// reported once.
    pub fn watchdog(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Number of ticks the watchdog timeout is split into.
    ///
    /// More divisions tighten the detection error (at most one
    /// `timeout / divisions`) at the cost of more timer wake-ups.
    pub fn divisions(mut self, divisions: u32) -> Self {
        self.divisions = divisions;
        self
    }

    /// Replaces the timeout report sink.
    ///
    /// # Arguments
    /// * `on_timeout` - Called with the instant the timeout fired, the task
    ///   label and its diagnostic pairs
    pub fn on_timeout<F>(mut self, on_timeout: F) -> Self
    where
        F: Fn(Instant, &str, &[KeyValue]) + Send + Sync + 'static,
    {
        self.on_timeout = Arc::new(on_timeout);
        self
    }

    /// Time source for the watchdog. Use a [`crate::time::ManualClock`] to
    /// drive timeouts deterministically.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Chooses what happens when a task panics.
    pub fn fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    /// Replaces the sink for panics caught under [`FaultPolicy::Isolate`].
    pub fn on_fault<F>(mut self, on_fault: F) -> Self
    where
        F: Fn(&TaskInfo, &str) + Send + Sync + 'static,
    {
        self.on_fault = Arc::new(on_fault);
        self
    }

    /// Builds the run loop and starts its consumer thread.
    ///
    /// # Errors
    /// - [`RunLoopError::InvalidTimeout`] / [`RunLoopError::InvalidDivisions`]
    ///   for an unusable watchdog configuration
    /// - [`RunLoopError::Spawn`] if a thread cannot be created
    pub fn build(self) -> Result<RunLoop, RunLoopError> {
        let watchdog = match self.timeout {
            Some(timeout) => Some(Watchdog::new(
                timeout,
                self.divisions,
                self.clock,
                self.on_timeout,
            )?),
            None => None,
        };

        debug!(
            target: "runloop",
            runloop = %self.name,
            watched = watchdog.is_some(),
            policy = ?self.fault_policy,
            "building run loop"
        );

        let core = Arc::new(Core::new(
            self.name,
            watchdog,
            self.fault_policy,
            self.on_fault,
        ));
        driver::start(core.clone())?;

        Ok(RunLoop::from_core(core))
    }
}
