//! Hang detection for task execution.
//!
//! The watchdog brackets every task with [`Watchdog::enter`] and
//! [`Watchdog::exit`]. While a task runs, a single reusable timer fires every
//! `timeout / divisions`; each expiry is one tick. When `divisions` ticks
//! accumulate before `exit`, the timeout callback is invoked once with the
//! task's label and diagnostics. The task itself is never interrupted.
//!
//! # States
//!
//! - **idle**: no task running, timer disarmed
//! - **armed**: `enter` was called; ticks accumulate until `exit`
//!
//! A tick arriving while idle (a timer expiry racing with `exit`) is ignored,
//! and no tick re-arms the timer once the timeout has fired. Worst-case
//! detection error is one period.
//!
//! # Example
//!
//! ```ignore
//! use runloop::{TaskInfo, Watchdog, time::SystemClock};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let watchdog = Watchdog::new(
//!     Duration::from_secs(5),
//!     4,
//!     Arc::new(SystemClock),
//!     Arc::new(|at, label, pairs| eprintln!("{label} hung at {at:?}: {pairs:?}")),
//! )?;
//!
//! watchdog.enter(Arc::new(TaskInfo::new("import")));
//! import_everything();
//! watchdog.exit();
//! ```

use crate::error::RunLoopError;
use crate::task::{KeyValue, TaskInfo};
use crate::time::{Clock, Timer};

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Timeout report sink: `(fired_at, label, pairs)`.
pub type TimeoutFn = dyn Fn(Instant, &str, &[KeyValue]) + Send + Sync;

/// Default number of ticks per timeout.
pub const DEFAULT_DIVISIONS: u32 = 4;

/// Timeout sink used when none is configured: a `warn` level event.
pub fn log_timeout(fired_at: Instant, label: &str, pairs: &[KeyValue]) {
    let pairs = pairs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");

    warn!(
        target: "runloop::watchdog",
        label,
        pairs = %pairs,
        fired_at = ?fired_at,
        "task exceeded watchdog timeout"
    );
}

#[derive(Default)]
struct WatchState {
    running: bool,
    ticks: u32,
    current: Option<Arc<TaskInfo>>,
    /// When the current task entered.
    entered_at: Option<Instant>,
    /// Earliest instant the pending timer expiry may be counted.
    deadline: Option<Instant>,
}

struct Inner {
    timeout: Duration,
    period: Duration,
    divisions: u32,
    clock: Arc<dyn Clock>,
    on_timeout: Arc<TimeoutFn>,
    state: Mutex<WatchState>,
    timer: OnceLock<Box<dyn Timer>>,
}

/// Tick-based hang detector.
///
/// Cloning yields another handle to the same detector.
#[derive(Clone)]
pub struct Watchdog {
    inner: Arc<Inner>,
}

impl Watchdog {
    /// Creates an idle watchdog that reports tasks running longer than
    /// `timeout`, checking every `timeout / divisions`.
    ///
    /// # Errors
    /// - [`RunLoopError::InvalidTimeout`] if `timeout` is zero
    /// - [`RunLoopError::InvalidDivisions`] if `divisions` is zero
    /// - [`RunLoopError::Spawn`] if the clock cannot create a timer
    pub fn new(
        timeout: Duration,
        divisions: u32,
        clock: Arc<dyn Clock>,
        on_timeout: Arc<TimeoutFn>,
    ) -> Result<Self, RunLoopError> {
        if timeout.is_zero() {
            return Err(RunLoopError::InvalidTimeout);
        }
        if divisions == 0 {
            return Err(RunLoopError::InvalidDivisions);
        }

        let inner = Arc::new(Inner {
            timeout,
            period: timeout / divisions,
            divisions,
            clock,
            on_timeout,
            state: Mutex::new(WatchState::default()),
            timer: OnceLock::new(),
        });

        // The timer only holds a weak reference so that dropping the last
        // watchdog handle also releases the timer.
        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let timer = inner.clock.timer(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                Watchdog { inner }.check();
            }
        }))?;
        let _ = inner.timer.set(timer);

        debug!(
            target: "runloop::watchdog",
            timeout = ?timeout,
            divisions,
            "watchdog created"
        );

        Ok(Self { inner })
    }

    /// Starts watching the task described by `info`.
    pub fn enter(&self, info: Arc<TaskInfo>) {
        let mut state = self.inner.state.lock();
        state.running = true;
        state.ticks = 0;
        state.current = Some(info);
        state.entered_at = Some(self.inner.clock.now());
        self.arm(&mut state, self.inner.period);
    }

    /// Stops watching the current task and returns to idle.
    pub fn exit(&self) {
        let mut state = self.inner.state.lock();
        state.running = false;
        state.ticks = 0;
        state.current = None;
        state.entered_at = None;
        state.deadline = None;
        if let Some(timer) = self.inner.timer.get() {
            timer.stop();
        }
    }

    /// Records one tick. Driven by the watchdog's timer.
    ///
    /// No-op while idle, once the current task's timeout has fired, or when
    /// called before the armed deadline: an expiry left over from a previous
    /// task never counts against the current one. The timeout only fires once
    /// the full `timeout` has elapsed since `enter`, even when `timeout` does
    /// not divide evenly into `divisions` periods.
    pub fn check(&self) {
        let expired = {
            let mut state = self.inner.state.lock();
            if !state.running || state.ticks >= self.inner.divisions {
                return;
            }

            let now = self.inner.clock.now();
            match state.deadline {
                Some(deadline) if now >= deadline => {}
                _ => return,
            }

            if state.ticks + 1 < self.inner.divisions {
                state.ticks += 1;
                trace!(target: "runloop::watchdog", ticks = state.ticks, "tick");
                self.arm(&mut state, self.inner.period);
                return;
            }

            let due = state.entered_at.map_or(now, |at| at + self.inner.timeout);
            if now < due {
                // Rounded-down periods fell short of the timeout.
                self.arm(&mut state, due - now);
                return;
            }

            state.ticks += 1;
            state.deadline = None;
            state.current.clone().map(|info| (now, info))
        };

        // Reported outside the lock: the sink may take arbitrarily long.
        if let Some((fired_at, info)) = expired {
            debug!(target: "runloop::watchdog", label = info.label(), "timeout fired");
            (self.inner.on_timeout)(fired_at, info.label(), info.pairs());
        }
    }

    /// Whether a task is currently being watched.
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Ticks accumulated by the current task.
    pub fn ticks(&self) -> u32 {
        self.inner.state.lock().ticks
    }

    /// Execution time after which a task is reported.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Interval between two ticks.
    pub fn period(&self) -> Duration {
        self.inner.period
    }

    /// Number of ticks the timeout is split into.
    pub fn divisions(&self) -> u32 {
        self.inner.divisions
    }

    // The deadline is taken before the timer is reset, so a genuine expiry
    // never arrives ahead of it.
    fn arm(&self, state: &mut WatchState, after: Duration) {
        state.deadline = Some(self.inner.clock.now() + after);
        if let Some(timer) = self.inner.timer.get() {
            timer.reset(after);
        }
    }
}

impl fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watchdog")
            .field("timeout", &self.inner.timeout)
            .field("divisions", &self.inner.divisions)
            .finish_non_exhaustive()
    }
}
