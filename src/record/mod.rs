//! Internal records for kernel entities.

pub mod thread;
