//! Internal helpers shared across modules.

pub(crate) mod slab;

pub(crate) use slab::Slab;
