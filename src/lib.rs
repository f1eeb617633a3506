//! Single-consumer run loop with two priority tiers and a hang watchdog.
//!
//! A run loop serializes work from any number of threads onto one dedicated
//! consumer thread. Tasks never run concurrently with each other, which makes
//! the loop a natural home for state that must only be touched from one place.
//!
//! # Architecture
//!
//! - **RunLoop**: Cloneable handle; submits to the normal or priority queue
//! - **RunLoopBuilder**: Fluent builder for naming, watchdog and panic policy
//! - **DualQueue**: Normal and priority FIFO queues behind one mutex
//! - **Driver**: The consumer thread; dequeues under the lock, runs without it
//! - **Watchdog**: Tick-based detector reporting tasks that run too long
//! - **Clock**: Injectable time source (system or manually advanced)
//!
//! # Example
//!
//! ```ignore
//! use runloop::{RunLoop, TaskInfo};
//! use std::time::Duration;
//!
//! let rl = RunLoop::builder()
//!     .watchdog(Duration::from_secs(2))
//!     .build()?;
//!
//! rl.spawn(TaskInfo::new("refresh").with("source", "disk"), || refresh());
//! let size = rl.sync("size", || cache_size());
//! rl.priority().spawn("evict", || evict());
//! rl.wait();
//! ```
//!
//! # Panics in tasks
//!
//! A panicking task is not caught by default: the panic ends the consumer
//! thread and no further task runs (see [`FaultPolicy`]). Choose
//! [`FaultPolicy::Isolate`] to contain panics per task instead.

mod builder;
mod error;
mod runtime;
mod task;
mod utils;
mod watchdog;

pub mod time;

pub use builder::RunLoopBuilder;
pub use error::RunLoopError;
pub use runtime::{FaultFn, FaultPolicy, Lane, RunLoop};
pub use runtime::fault::log_fault;
pub use task::{KeyValue, TaskInfo};
pub use watchdog::{DEFAULT_DIVISIONS, TimeoutFn, Watchdog, log_timeout};
