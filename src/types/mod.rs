//! Core types: handles, priorities, tick time and wakeup payloads.

pub mod id;
pub mod priority;
pub mod time;
pub mod wake;

pub use id::{CondvarId, MailboxId, MutexId, SemaphoreId, ThreadId, TimerId};
pub use priority::Priority;
pub use time::{Tick, Timeout};
pub use wake::{EventMask, Message, Progress, WakeReason};
