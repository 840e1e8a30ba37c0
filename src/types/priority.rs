//! Thread priorities.

use core::fmt;

/// A thread priority; higher values are more urgent.
///
/// The idle thread runs at [`Priority::IDLE`] and must stay the only thread
/// at that level. Application threads normally sit around
/// [`Priority::NORMAL`] and move up or down from there.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    /// Reserved for the idle thread.
    pub const IDLE: Self = Self(0);
    /// Lowest priority available to application threads.
    pub const LOWEST: Self = Self(1);
    /// Default priority for new threads.
    pub const NORMAL: Self = Self(64);
    /// Highest application priority.
    pub const HIGHEST: Self = Self(255);

    /// Creates a priority from a raw level.
    #[must_use]
    pub const fn new(level: u8) -> Self {
        Self(level)
    }

    /// The raw priority level.
    #[must_use]
    pub const fn level(self) -> u8 {
        self.0
    }

    /// The higher of two priorities.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

impl From<u8> for Priority {
    fn from(level: u8) -> Self {
        Self(level)
    }
}
