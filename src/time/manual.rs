//! Virtual time for deterministic tests.
//!
//! A [`ManualClock`] starts at the instant it was created and only moves forward
//! when [`ManualClock::advance`] is called. Timers created from it fire
//! synchronously on the advancing thread, in deadline order, while virtual time
//! is stepped to each deadline in turn.

use crate::time::{Clock, Timer, TimerCallback};
use crate::utils::Slab;

use parking_lot::Mutex;
use std::io;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

struct Registration {
    /// Offset from the clock's origin at which the timer fires.
    deadline: Option<Duration>,
    /// Arming order, breaks ties between equal deadlines.
    sequence: u64,
    callback: Arc<dyn Fn() + Send + Sync>,
}

struct ClockState {
    origin: Instant,
    elapsed: Duration,
    next_sequence: u64,
    timers: Slab<Registration>,
}

/// A clock whose time is advanced explicitly.
///
/// Cloning yields another handle to the same virtual time.
///
/// # Example
/// ```ignore
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(3));
/// assert_eq!(clock.now() - start, Duration::from_secs(3));
/// ```
#[derive(Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ClockState>>,
}

impl ManualClock {
    /// Creates a clock whose virtual time starts now, with no timers.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState {
                origin: Instant::now(),
                elapsed: Duration::ZERO,
                next_sequence: 0,
                timers: Slab::new(4),
            })),
        }
    }

    /// Total virtual time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    /// Number of timers currently armed.
    pub fn armed(&self) -> usize {
        self.state
            .lock()
            .timers
            .iter()
            .filter(|(_, timer)| timer.deadline.is_some())
            .count()
    }

    /// Moves virtual time forward by `by`, firing every timer whose deadline
    /// is reached along the way.
    ///
    /// Timers re-armed from inside a callback fire again in the same call if
    /// their new deadline still falls within the advanced window.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().elapsed + by;

        loop {
            let callback = {
                let mut state = self.state.lock();

                let due = state
                    .timers
                    .iter()
                    .filter_map(|(index, timer)| {
                        timer
                            .deadline
                            .filter(|deadline| *deadline <= target)
                            .map(|deadline| (deadline, timer.sequence, index))
                    })
                    .min();

                let Some((deadline, _, index)) = due else {
                    state.elapsed = target;
                    break;
                };

                state.elapsed = state.elapsed.max(deadline);
                match state.timers.get_mut(index) {
                    Some(timer) => {
                        timer.deadline = None;
                        timer.callback.clone()
                    }
                    None => continue,
                }
            };

            callback();
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let state = self.state.lock();
        state.origin + state.elapsed
    }

    fn timer(&self, callback: TimerCallback) -> io::Result<Box<dyn Timer>> {
        let index = self.state.lock().timers.insert(Registration {
            deadline: None,
            sequence: 0,
            callback: Arc::from(callback),
        });

        Ok(Box::new(ManualTimer {
            state: Arc::downgrade(&self.state),
            index,
        }))
    }
}

/// A timer registered with a [`ManualClock`].
struct ManualTimer {
    state: Weak<Mutex<ClockState>>,
    index: usize,
}

impl Timer for ManualTimer {
    fn reset(&self, after: Duration) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut state = state.lock();

        let deadline = state.elapsed + after;
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        if let Some(timer) = state.timers.get_mut(self.index) {
            timer.deadline = Some(deadline);
            timer.sequence = sequence;
        }
    }

    fn stop(&self) -> bool {
        let Some(state) = self.state.upgrade() else {
            return false;
        };
        let mut state = state.lock();

        state
            .timers
            .get_mut(self.index)
            .and_then(|timer| timer.deadline.take())
            .is_some()
    }
}

impl Drop for ManualTimer {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.lock().timers.remove(self.index);
        }
    }
}
