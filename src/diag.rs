//! Logging shim over the `tracing` crate.
//!
//! With the `tracing-integration` feature enabled (the default) these are
//! the real `tracing` macros; without it they expand to nothing, so the
//! scheduler hot paths carry no logging cost at all.

#[cfg(feature = "tracing-integration")]
pub(crate) use tracing::{debug, trace};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    macro_rules! debug {
        ($($arg:tt)*) => {};
    }

    pub(crate) use {debug, trace};
}

#[cfg(not(feature = "tracing-integration"))]
pub(crate) use noop::{debug, trace};
