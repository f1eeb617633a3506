//! Run loop subsystem modules.

mod core;
pub(crate) mod driver;
pub mod fault;
pub(crate) mod queue;

pub(crate) use self::core::Core;
pub use self::core::RunLoop;
pub use fault::{FaultFn, FaultPolicy};
pub use queue::Lane;
