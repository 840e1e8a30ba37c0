//! Tickos: deterministic core of a preemptive, priority-based real-time kernel.
//!
//! # Overview
//!
//! Tickos models the concurrency core of an embedded operating system as a
//! single-owner state machine: one [`Kernel`] value owns the thread pool, the
//! ready list, the virtual-timer list and every synchronization object, and
//! every entry point takes `&mut Kernel`. There is no global state and no
//! `unsafe`; several independent kernels can coexist in one process, which is
//! what makes the scheduler testable tick by tick on a host.
//!
//! The processor-specific pieces stay outside: a [`ContextPort`]
//! implementation receives every context-switch decision and is expected to
//! swap stacks (or, in tests, to record the sequence). Thread bodies are
//! never executed by this crate — the kernel decides *who* runs, the port
//! decides *how*.
//!
//! # Core Guarantees
//!
//! - **Strict priority scheduling**: the ready list is sorted by descending
//!   priority and is FIFO-stable among equals; selection is always the head.
//! - **Exactly one current thread**: the `current` pointer is mutated only
//!   inside the kernel critical section.
//! - **No lost wakeups**: a waiter is enqueued on its wait object before the
//!   context switch, atomically under the kernel lock.
//! - **Exactly-one timed-wait resolution**: a timed wait resolves by signal
//!   or by timeout, never both — the winning path cancels the loser.
//! - **Delta-encoded timers**: the per-tick cost is O(1) when nothing is due,
//!   and equal deadlines fire in arming order.
//!
//! # Module Structure
//!
//! - [`types`]: identifiers, priorities, tick time, wakeup payloads
//! - [`kernel`]: the [`Kernel`] state machine, lock/ISR discipline, scheduler
//! - [`timer`]: delta-list virtual timers driven by the periodic tick
//! - [`wait`]: wait queues and the generic block/wakeup/timeout protocol
//! - [`sync`]: semaphores, mutexes, condition variables, mailboxes, events
//! - [`util`]: generational slot arena backing every handle type
//! - [`test_utils`]: recording port and kernel constructors for tests
//!
//! # Example
//!
//! ```
//! use tickos::{Kernel, KernelConfig, ThreadConfig};
//! use tickos::types::Priority;
//!
//! let mut k = Kernel::new(KernelConfig::default());
//! let worker = k
//!     .spawn(ThreadConfig::new("worker").with_priority(Priority::new(80)))
//!     .unwrap();
//! k.resume(worker);
//! // The worker outranks the boot thread, so it is now current.
//! assert_eq!(k.current(), worker);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]

pub mod kernel;
pub mod sync;
pub mod test_utils;
pub mod timer;
pub mod types;
pub mod util;
pub mod wait;

mod diag;
mod record;

pub use kernel::{ContextPort, Kernel, KernelConfig, KernelStats, NullPort, SpawnError};
pub use record::thread::{ThreadConfig, ThreadState};
pub use timer::TimerError;
pub use types::{
    CondvarId, EventMask, MailboxId, Message, MutexId, Priority, Progress, SemaphoreId, ThreadId,
    Tick, TimerId, Timeout, WakeReason,
};
pub use wait::{QueueOrder, WaitError, WouldBlock};
