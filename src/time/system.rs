//! Wall-clock timers backed by parked helper threads.
//!
//! Each [`SystemTimer`] owns one thread that sleeps on a condvar until its
//! deadline passes or the deadline changes. Resetting or stopping the timer
//! only updates the shared deadline and notifies the thread.

use crate::time::{Clock, Timer, TimerCallback};

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// The process' monotonic clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a handle to the system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn timer(&self, callback: TimerCallback) -> io::Result<Box<dyn Timer>> {
        Ok(Box::new(SystemTimer::spawn(callback)?))
    }
}

struct TimerState {
    deadline: Option<Instant>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<TimerState>,
    notify: Condvar,
}

/// A one-shot timer firing on its own helper thread.
///
/// Dropping the timer asks the helper thread to exit. The thread is not
/// joined: the drop may happen from inside the timer's own callback.
pub struct SystemTimer {
    shared: Arc<Shared>,
}

impl SystemTimer {
    /// Starts the helper thread for a new, disarmed timer.
    pub fn spawn(callback: TimerCallback) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(TimerState {
                deadline: None,
                shutdown: false,
            }),
            notify: Condvar::new(),
        });

        let worker = shared.clone();
        thread::Builder::new()
            .name("runloop-timer".to_string())
            .spawn(move || run(&worker, callback))?;

        Ok(Self { shared })
    }
}

impl Timer for SystemTimer {
    fn reset(&self, after: Duration) {
        let mut state = self.shared.state.lock();
        state.deadline = Some(Instant::now() + after);
        self.shared.notify.notify_one();
    }

    fn stop(&self) -> bool {
        let mut state = self.shared.state.lock();
        let was_armed = state.deadline.take().is_some();
        self.shared.notify.notify_one();
        was_armed
    }
}

impl Drop for SystemTimer {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.shutdown = true;
        state.deadline = None;
        self.shared.notify.notify_one();
    }
}

fn run(shared: &Shared, callback: TimerCallback) {
    let mut state = shared.state.lock();

    loop {
        if state.shutdown {
            break;
        }

        let Some(deadline) = state.deadline else {
            shared.notify.wait(&mut state);
            continue;
        };

        if Instant::now() < deadline {
            // Woken early either by a new deadline or by the timeout itself;
            // both cases are re-evaluated from the top.
            let _ = shared.notify.wait_until(&mut state, deadline);
            continue;
        }

        state.deadline = None;
        MutexGuard::unlocked(&mut state, || callback());
    }
}
