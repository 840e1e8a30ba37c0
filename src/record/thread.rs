//! Thread descriptor and lifecycle state machine.
//!
//! Embedded kernels traditionally pack the wait payload into a union reused
//! across states (wait-object pointer, pending event mask, exit code); here
//! that union is a sum type keyed by the state itself, so an impossible
//! combination does not typecheck instead of relying on state discipline.

use crate::types::{
    CondvarId, EventMask, MailboxId, Message, MutexId, Priority, SemaphoreId, ThreadId, TimerId,
    WakeReason,
};
use core::fmt;
use smallvec::SmallVec;

/// Creation parameters for a thread.
///
/// The kernel never allocates stacks itself; `stack_size` is carried for the
/// context port, which owns the real storage.
#[derive(Clone, Copy, Debug)]
pub struct ThreadConfig {
    /// Diagnostic name, also shown in trace output.
    pub name: &'static str,
    /// Initial (base) priority.
    pub priority: Priority,
    /// Stack size hint for the context port, in bytes.
    pub stack_size: usize,
}

impl ThreadConfig {
    /// Creates a config with [`Priority::NORMAL`] and the default stack hint.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            priority: Priority::NORMAL,
            stack_size: 1024,
        }
    }

    /// Sets the base priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the stack size hint.
    #[must_use]
    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }
}

/// The lifecycle state of a thread, including its wait payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    /// Created but never scheduled.
    Suspended,
    /// Runnable, sitting in the ready list.
    Ready,
    /// Executing; exactly one thread system-wide is in this state.
    Current,
    /// Sleeping until a virtual timer fires.
    Sleeping,
    /// Blocked on a semaphore's wait queue.
    WaitingSemaphore {
        /// The semaphore being waited on.
        semaphore: SemaphoreId,
    },
    /// Blocked on a mutex's wait queue.
    WaitingMutex {
        /// The contended mutex.
        mutex: MutexId,
    },
    /// Blocked on a condition variable.
    WaitingCondvar {
        /// The condition variable being waited on.
        condvar: CondvarId,
        /// The mutex released for the duration of the wait.
        mutex: MutexId,
    },
    /// Blocked posting into a full mailbox; carries the undelivered message.
    PostingMailbox {
        /// The full mailbox.
        mailbox: MailboxId,
        /// The message to deliver once space frees up.
        message: Message,
    },
    /// Blocked fetching from an empty mailbox.
    FetchingMailbox {
        /// The empty mailbox.
        mailbox: MailboxId,
    },
    /// Waiting for at least one of the masked events.
    WaitingAnyEvents {
        /// Events that satisfy the wait.
        events: EventMask,
    },
    /// Waiting for all of the masked events.
    WaitingAllEvents {
        /// Events that must all be pending.
        events: EventMask,
    },
    /// Waiting for another thread to terminate.
    WaitingJoin {
        /// The thread whose exit is awaited.
        target: ThreadId,
    },
    /// Terminated; carries the exit code. Terminal.
    Final {
        /// The exit code recorded at termination.
        exit: Message,
    },
}

impl ThreadState {
    /// True for the terminal state.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. })
    }

    /// True if the thread is suspended on a wait object, a timer or a join.
    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        !matches!(
            self,
            Self::Suspended | Self::Ready | Self::Current | Self::Final { .. }
        )
    }

    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Suspended => "suspended",
            Self::Ready => "ready",
            Self::Current => "current",
            Self::Sleeping => "sleeping",
            Self::WaitingSemaphore { .. } => "waiting-semaphore",
            Self::WaitingMutex { .. } => "waiting-mutex",
            Self::WaitingCondvar { .. } => "waiting-condvar",
            Self::PostingMailbox { .. } => "posting-mailbox",
            Self::FetchingMailbox { .. } => "fetching-mailbox",
            Self::WaitingAnyEvents { .. } => "waiting-any-events",
            Self::WaitingAllEvents { .. } => "waiting-all-events",
            Self::WaitingJoin { .. } => "waiting-join",
            Self::Final { .. } => "final",
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Internal descriptor for one thread.
///
/// Linkage into the ready list, wait queues and the timer list is expressed
/// through the kernel's queues holding this record's [`ThreadId`]; the
/// single-list-membership invariant of an intrusive-link design becomes
/// "the state says which queue may contain this id".
#[derive(Debug)]
pub struct ThreadRecord {
    /// This record's handle.
    pub id: ThreadId,
    /// Diagnostic name.
    pub name: &'static str,
    /// Priority assigned at creation / by the application.
    pub base_priority: Priority,
    /// Effective priority, raised above base by priority inheritance.
    pub priority: Priority,
    /// Lifecycle state plus wait payload.
    pub state: ThreadState,
    /// Outcome of the most recent suspension, written by the waker.
    pub wake: Option<WakeReason>,
    /// Remaining round-robin quantum, in ticks.
    pub quantum: u32,
    /// Timeout timer armed for the current wait, if any.
    pub timeout_timer: Option<TimerId>,
    /// Event flags delivered but not yet consumed.
    pub pending_events: EventMask,
    /// Mutexes owned, most recently locked first.
    pub owned_mutexes: SmallVec<[MutexId; 2]>,
    /// Threads blocked waiting for this thread to terminate.
    pub joiners: SmallVec<[ThreadId; 2]>,
    /// Cooperative termination request flag.
    pub terminate_requested: bool,
    /// Reference count guarding pool reclamation of the descriptor.
    pub refs: u32,
    /// Stack size hint passed to the context port.
    pub stack_size: usize,
}

impl ThreadRecord {
    /// Creates a descriptor in the `Suspended` state.
    #[must_use]
    pub fn new(id: ThreadId, config: &ThreadConfig, quantum: u32) -> Self {
        Self {
            id,
            name: config.name,
            base_priority: config.priority,
            priority: config.priority,
            state: ThreadState::Suspended,
            wake: None,
            quantum,
            timeout_timer: None,
            pending_events: EventMask::EMPTY,
            owned_mutexes: SmallVec::new(),
            joiners: SmallVec::new(),
            terminate_requested: false,
            refs: 1,
            stack_size: config.stack_size,
        }
    }
}
