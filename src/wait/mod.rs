//! Wait queues and the shared blocking/wakeup protocol.
//!
//! Every synchronization object follows one pattern: under the kernel lock,
//! check the condition; if unsatisfied, enqueue the current thread on the
//! object's wait queue, optionally arm a timeout timer, and suspend. The
//! waker performs all completion work (counter handoff, message transfer,
//! ownership transfer) before making the waiter ready, so a resumed thread
//! never runs fix-up code of its own.
//!
//! Timed waits resolve exactly once. The signal path cancels the armed
//! timer (including one already detached by the tick drain but not yet
//! executed); the timeout path — [`Kernel::timeout_expired`] — undoes the
//! object-specific bookkeeping keyed by the thread's wait state before
//! waking it with [`WakeReason::Timeout`].

use crate::diag::trace;
use crate::kernel::Kernel;
use crate::record::thread::{ThreadRecord, ThreadState};
use crate::types::{Message, ThreadId, WakeReason};
use crate::util::Arena;
use std::collections::VecDeque;

/// Ordering policy for a wait queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueueOrder {
    /// First blocked, first woken.
    #[default]
    Fifo,
    /// Highest effective priority first; FIFO among equals. Used by objects
    /// with an owner, where FIFO order would invite priority inversion.
    Priority,
}

/// Outcome of a timed wait that did not succeed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// The deadline expired before the condition was satisfied. An expected
    /// outcome of any timed wait, not a fault.
    #[error("wait timed out")]
    Timeout,
    /// The wait object was reset while the thread was queued on it.
    #[error("wait object was reset")]
    Reset,
}

/// Error returned by non-blocking `try_*` operations that found the
/// condition unsatisfied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, thiserror::Error)]
#[error("operation would block")]
pub struct WouldBlock;

impl WakeReason {
    /// Maps a wakeup outcome to a wait result: the delivered payload on
    /// success, the distinct timeout/reset outcome otherwise.
    ///
    /// # Errors
    ///
    /// [`WaitError::Timeout`] and [`WaitError::Reset`] for the respective
    /// outcomes; timeouts are an expected result of any timed wait.
    pub fn into_wait_result(self) -> Result<Message, WaitError> {
        match self {
            Self::Signal(message) => Ok(message),
            Self::Events(events) => Ok(Message::new(u64::from(events.bits()))),
            Self::Timeout => Err(WaitError::Timeout),
            Self::Reset => Err(WaitError::Reset),
        }
    }
}

/// A queue of blocked threads owned by one synchronization object.
///
/// Threads are stored by handle; the descriptor's state names the object it
/// is queued on, which is what keeps "a thread is in at most one list" a
/// checkable property rather than a convention.
#[derive(Debug)]
pub(crate) struct WaitQueue {
    order: QueueOrder,
    queue: VecDeque<ThreadId>,
}

impl WaitQueue {
    pub(crate) const fn new(order: QueueOrder) -> Self {
        Self {
            order,
            queue: VecDeque::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn front(&self) -> Option<ThreadId> {
        self.queue.front().copied()
    }

    /// Enqueues per the ordering policy; priority insertion goes behind
    /// existing entries of equal priority.
    pub(crate) fn insert(&mut self, threads: &Arena<ThreadRecord>, id: ThreadId) {
        debug_assert!(!self.queue.contains(&id), "thread already queued");
        match self.order {
            QueueOrder::Fifo => self.queue.push_back(id),
            QueueOrder::Priority => {
                let prio = |t: ThreadId| {
                    threads
                        .get(t.arena_index())
                        .map(|rec| rec.priority)
                        .unwrap_or_default()
                };
                let new = prio(id);
                let pos = self
                    .queue
                    .iter()
                    .position(|&t| prio(t) < new)
                    .unwrap_or(self.queue.len());
                self.queue.insert(pos, id);
            }
        }
    }

    pub(crate) fn remove(&mut self, id: ThreadId) -> bool {
        if let Some(pos) = self.queue.iter().position(|&t| t == id) {
            self.queue.remove(pos);
            true
        } else {
            false
        }
    }

    pub(crate) fn pop_front(&mut self) -> Option<ThreadId> {
        self.queue.pop_front()
    }

    /// Re-sorts one member after its effective priority changed. FIFO
    /// queues keep arrival order and are left untouched.
    pub(crate) fn requeue(&mut self, threads: &Arena<ThreadRecord>, id: ThreadId) {
        if self.order == QueueOrder::Priority && self.remove(id) {
            self.insert(threads, id);
        }
    }

    /// Empties the queue, returning the former members in queue order.
    pub(crate) fn drain_all(&mut self) -> VecDeque<ThreadId> {
        std::mem::take(&mut self.queue)
    }
}

impl Kernel {
    /// Resolves an expired wait timeout for `thread`.
    ///
    /// Mirrors the generic timeout handler of the wait protocol: undo the
    /// object-specific bookkeeping keyed by the wait state, then wake the
    /// thread with [`WakeReason::Timeout`]. A thread already woken by a
    /// racing signal is left alone — the signal path cancelled this timer,
    /// so getting here with a non-waiting thread is the benign tail of a
    /// same-tick race.
    pub(crate) fn timeout_expired(&mut self, thread: ThreadId) {
        self.assert_locked();
        let Some(rec) = self.threads.get_mut(thread.arena_index()) else {
            return;
        };
        rec.timeout_timer = None;
        let state = rec.state;
        trace!(thread = %thread, state = %state, "wait timeout expired");
        match state {
            ThreadState::Ready
            | ThreadState::Current
            | ThreadState::Suspended
            | ThreadState::Final { .. } => return,
            ThreadState::Sleeping
            | ThreadState::WaitingAnyEvents { .. }
            | ThreadState::WaitingAllEvents { .. } => {}
            ThreadState::WaitingSemaphore { semaphore } => {
                if let Some(sem) = self.semaphores.get_mut(semaphore.arena_index()) {
                    sem.count += 1;
                    sem.queue.remove(thread);
                }
            }
            ThreadState::WaitingMutex { mutex } => {
                // Mutex waits are untimed; reachable only through misuse.
                debug_assert!(false, "timeout on an untimed mutex wait");
                if let Some(m) = self.mutexes.get_mut(mutex.arena_index()) {
                    m.queue.remove(thread);
                }
            }
            ThreadState::WaitingCondvar { condvar, .. } => {
                if let Some(cv) = self.condvars.get_mut(condvar.arena_index()) {
                    cv.queue.remove(thread);
                }
            }
            ThreadState::PostingMailbox { mailbox, .. } => {
                if let Some(mb) = self.mailboxes.get_mut(mailbox.arena_index()) {
                    mb.post_queue.remove(thread);
                }
            }
            ThreadState::FetchingMailbox { mailbox } => {
                if let Some(mb) = self.mailboxes.get_mut(mailbox.arena_index()) {
                    mb.fetch_queue.remove(thread);
                }
            }
            ThreadState::WaitingJoin { target } => {
                debug_assert!(false, "timeout on an untimed join");
                if let Some(t) = self.threads.get_mut(target.arena_index()) {
                    t.joiners.retain(|j| *j != thread);
                }
            }
        }
        self.wakeup(thread, WakeReason::Timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::thread::ThreadConfig;
    use crate::types::Priority;

    fn arena_with(prios: &[u8]) -> (Arena<ThreadRecord>, Vec<ThreadId>) {
        let mut arena = Arena::new();
        let ids = prios
            .iter()
            .map(|&p| {
                let cfg = ThreadConfig::new("t").with_priority(Priority::new(p));
                ThreadId::from_arena(arena.insert_with(|ix| {
                    ThreadRecord::new(ThreadId::from_arena(ix), &cfg, 0)
                }))
            })
            .collect();
        (arena, ids)
    }

    #[test]
    fn fifo_queue_preserves_arrival_order() {
        let (arena, ids) = arena_with(&[10, 90, 50]);
        let mut q = WaitQueue::new(QueueOrder::Fifo);
        for &id in &ids {
            q.insert(&arena, id);
        }
        assert_eq!(q.pop_front(), Some(ids[0]));
        assert_eq!(q.pop_front(), Some(ids[1]));
        assert_eq!(q.pop_front(), Some(ids[2]));
    }

    #[test]
    fn priority_queue_is_sorted_and_stable() {
        let (arena, ids) = arena_with(&[10, 90, 50, 90]);
        let mut q = WaitQueue::new(QueueOrder::Priority);
        for &id in &ids {
            q.insert(&arena, id);
        }
        // 90 (first-arrived), 90 (second), 50, 10.
        assert_eq!(q.pop_front(), Some(ids[1]));
        assert_eq!(q.pop_front(), Some(ids[3]));
        assert_eq!(q.pop_front(), Some(ids[2]));
        assert_eq!(q.pop_front(), Some(ids[0]));
    }

    #[test]
    fn remove_middle_entry() {
        let (arena, ids) = arena_with(&[1, 2, 3]);
        let mut q = WaitQueue::new(QueueOrder::Fifo);
        for &id in &ids {
            q.insert(&arena, id);
        }
        assert!(q.remove(ids[1]));
        assert!(!q.remove(ids[1]));
        assert_eq!(q.len(), 2);
    }
}
