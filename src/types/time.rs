//! Kernel time expressed in ticks of the periodic interrupt.

use core::fmt;
use core::num::NonZeroU64;
use core::ops::Add;

/// An absolute point in kernel time, counted in ticks since boot.
///
/// A 64-bit counter does not wrap within the lifetime of any deployment at
/// realistic tick rates, so no wrap-around arithmetic is carried here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(u64);

impl Tick {
    /// Boot time.
    pub const ZERO: Self = Self(0);

    /// Creates an absolute tick value.
    #[must_use]
    pub const fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Raw tick count.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The immediately following tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Ticks from `self` until `later`, zero if `later` is not in the future.
    #[must_use]
    pub const fn until(self, later: Self) -> u64 {
        later.0.saturating_sub(self.0)
    }
}

impl Add<u64> for Tick {
    type Output = Self;

    fn add(self, ticks: u64) -> Self {
        Self(self.0 + ticks)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Deadline policy for a blocking operation.
///
/// "Immediate" is deliberately not representable: a zero-tick deadline is
/// rejected by the timer subsystem, and non-blocking attempts go through the
/// dedicated `try_*` operations instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Wait until signalled, however long that takes.
    Infinite,
    /// Give up after this many ticks.
    After(NonZeroU64),
}

impl Timeout {
    /// A timeout of `ticks` ticks.
    ///
    /// `ticks` must be non-zero; zero is a contract violation and is clamped
    /// to one tick in release builds.
    #[must_use]
    pub fn after(ticks: u64) -> Self {
        debug_assert!(ticks > 0, "zero-tick timeout; use a try_* operation");
        Self::After(NonZeroU64::new(ticks.max(1)).expect("clamped to at least one tick"))
    }

    /// True for [`Timeout::Infinite`].
    #[must_use]
    pub const fn is_infinite(self) -> bool {
        matches!(self, Self::Infinite)
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infinite => write!(f, "infinite"),
            Self::After(n) => write!(f, "{n} ticks"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn until_saturates() {
        assert_eq!(Tick::new(10).until(Tick::new(25)), 15);
        assert_eq!(Tick::new(25).until(Tick::new(10)), 0);
    }

    #[test]
    fn timeout_display() {
        assert_eq!(Timeout::Infinite.to_string(), "infinite");
        assert_eq!(Timeout::after(3).to_string(), "3 ticks");
    }
}
