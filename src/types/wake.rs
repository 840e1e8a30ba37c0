//! Wakeup payloads and the deferred-completion result type.

use core::fmt;
use core::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// A message word passed through wakeups, mailboxes and thread exit codes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Message(u64);

impl Message {
    /// The empty message, used by wakeups that carry no payload.
    pub const NONE: Self = Self(0);

    /// Creates a message from a raw word.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw message word.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg:{:#x}", self.0)
    }
}

impl From<u64> for Message {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A set of event flags owned by a thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EventMask(u32);

impl EventMask {
    /// No events.
    pub const EMPTY: Self = Self(0);
    /// All 32 events.
    pub const ALL: Self = Self(u32::MAX);

    /// Creates a mask from raw bits.
    #[must_use]
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// The mask with only event `n` (0..=31) set.
    #[must_use]
    pub const fn event(n: u32) -> Self {
        Self(1 << n)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if no event is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every event in `other` is also set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if at least one event is shared with `other`.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for EventMask {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "events:{:#010b}", self.0)
    }
}

/// Why a blocked thread was made ready again.
///
/// Stored in the thread's record by whichever side resolved the wait; the
/// two resolution paths of a timed wait are mutually exclusive, so exactly
/// one reason is ever delivered per suspension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeReason {
    /// Signalled by another thread or an ISR; carries the delivered message
    /// ([`Message::NONE`] for pure signals).
    Signal(Message),
    /// An event wait was satisfied; carries the served flags.
    Events(EventMask),
    /// The wait's deadline expired first. For a plain sleep this is the
    /// normal outcome, not a failure.
    Timeout,
    /// The wait object was reset or torn down underneath the waiter.
    Reset,
}

impl WakeReason {
    /// True for [`WakeReason::Timeout`].
    #[must_use]
    pub const fn is_timeout(self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl fmt::Display for WakeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(m) => write!(f, "signal({m})"),
            Self::Events(e) => write!(f, "events({e})"),
            Self::Timeout => write!(f, "timeout"),
            Self::Reset => write!(f, "reset"),
        }
    }
}

/// Outcome of an operation that may suspend the calling thread.
///
/// The kernel never runs thread code, so a blocking call cannot literally
/// park its host-side caller. Instead it either completes in place or
/// records the suspension, switches to the ready-list head, and delivers the
/// eventual [`WakeReason`] through the thread's record (see
/// [`crate::Kernel::last_wake`]).
#[must_use = "a Blocked progress means the calling thread is no longer current"]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress<T> {
    /// The operation completed without blocking.
    Immediate(T),
    /// The calling thread suspended; the outcome arrives with its wakeup.
    Blocked,
}

impl<T> Progress<T> {
    /// True if the calling thread suspended.
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked)
    }

    /// The immediate value, if the operation did not block.
    pub fn immediate(self) -> Option<T> {
        match self {
            Self::Immediate(value) => Some(value),
            Self::Blocked => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_mask_ops() {
        let a = EventMask::event(0) | EventMask::event(3);
        assert!(a.intersects(EventMask::event(3)));
        assert!(!a.contains(EventMask::event(1)));
        assert!(a.contains(EventMask::event(0) | EventMask::event(3)));
        assert_eq!(a & !EventMask::event(0), EventMask::event(3));
    }

    #[test]
    fn progress_accessors() {
        assert_eq!(Progress::Immediate(7).immediate(), Some(7));
        assert!(Progress::<u32>::Blocked.is_blocked());
    }
}
