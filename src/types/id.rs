//! Type-safe identifiers for kernel entities.
//!
//! Every identifier wraps a generational [`ArenaIndex`], so a handle held
//! across the destruction of its record is detected as stale rather than
//! silently naming a recycled slot.

use crate::util::ArenaIndex;
use core::fmt;

macro_rules! kernel_id {
    ($(#[$doc:meta])* $name:ident, $tag:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) ArenaIndex);

        impl $name {
            pub(crate) const fn from_arena(index: ArenaIndex) -> Self {
                Self(index)
            }

            pub(crate) const fn arena_index(self) -> ArenaIndex {
                self.0
            }

            /// Builds an identifier from raw parts, for tests that need
            /// deterministic handle values.
            #[doc(hidden)]
            #[must_use]
            pub const fn from_raw_parts(slot: u32, generation: u32) -> Self {
                Self(ArenaIndex::from_parts(slot, generation))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    concat!(stringify!($name), "({}:{})"),
                    self.0.slot(),
                    self.0.generation()
                )
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "{}"), self.0.slot())
            }
        }
    };
}

kernel_id!(
    /// A thread in the kernel's thread pool.
    ThreadId,
    "T"
);
kernel_id!(
    /// An armed (or pending) virtual timer.
    TimerId,
    "V"
);
kernel_id!(
    /// A counting semaphore.
    SemaphoreId,
    "S"
);
kernel_id!(
    /// A mutex with ownership transfer and priority inheritance.
    MutexId,
    "M"
);
kernel_id!(
    /// A condition variable.
    CondvarId,
    "C"
);
kernel_id!(
    /// A fixed-capacity message mailbox.
    MailboxId,
    "B"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_compact() {
        let t = ThreadId::from_raw_parts(3, 1);
        assert_eq!(t.to_string(), "T3");
        assert_eq!(format!("{t:?}"), "ThreadId(3:1)");
    }
}
