//! Time sources for the watchdog.
//!
//! The watchdog never talks to OS timers directly. It asks a [`Clock`] for the
//! current instant and for one-shot [`Timer`]s that invoke a callback once their
//! deadline passes. Two clocks are provided:
//!
//! - [`SystemClock`]: wall-clock time, each timer parked on its own helper thread
//! - [`ManualClock`]: virtual time that only moves when [`ManualClock::advance`]
//!   is called, for deterministic tests
//!
//! # Example
//!
//! ```ignore
//! use runloop::time::{Clock, ManualClock};
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let timer = clock.timer(Box::new(|| println!("fired"))).unwrap();
//! timer.reset(Duration::from_millis(10));
//! clock.advance(Duration::from_millis(10)); // prints "fired"
//! ```

pub mod manual;
pub mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

use std::io;
use std::time::{Duration, Instant};

/// Callback run by a [`Timer`] when it expires.
///
/// Called without any clock or timer lock held, so it may freely re-arm the
/// timer that invoked it.
pub type TimerCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// A resettable one-shot timer.
///
/// A fresh timer is disarmed. Arming it again before it fires replaces the
/// previous deadline; there is never more than one pending expiry.
pub trait Timer: Send + Sync {
    /// Arms the timer to fire once `after` has elapsed from now.
    fn reset(&self, after: Duration);

    /// Disarms the timer.
    ///
    /// Returns `true` if a pending expiry was cancelled. A callback that is
    /// already running is not interrupted.
    fn stop(&self) -> bool;
}

/// Source of time and timers.
pub trait Clock: Send + Sync {
    /// Returns the current instant as seen by this clock.
    fn now(&self) -> Instant;

    /// Creates a disarmed timer that runs `callback` on each expiry.
    ///
    /// # Errors
    /// Returns an error if the clock cannot allocate the resources backing the
    /// timer (e.g. a helper thread).
    fn timer(&self, callback: TimerCallback) -> io::Result<Box<dyn Timer>>;
}
