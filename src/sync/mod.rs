//! Blocking synchronization primitives built on the generic wait protocol.
//!
//! Each primitive owns its wait queue and keeps its bookkeeping in a record
//! inside the kernel, so the timeout path can always find and undo a
//! half-completed wait. All of them follow the same shape: check under the
//! lock, block if unsatisfied, and let the *waking* side complete the
//! operation on the waiter's behalf.

pub mod condvar;
pub mod events;
pub mod mailbox;
pub mod mutex;
pub mod semaphore;
