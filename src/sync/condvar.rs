//! Condition variables, coupled to mutexes.
//!
//! A waiter atomically releases its mutex and parks on the condition
//! variable's priority-ordered queue. Signalling performs *wait morphing*:
//! if the mutex is free the woken thread acquires it on the spot; otherwise
//! the thread moves straight onto the mutex's wait queue without waking,
//! so a broadcast never stampedes N threads at a 1-entry door.
//!
//! A timed wait's deadline covers only the condition-variable phase. On
//! timeout the mutex is *not* re-acquired — the caller must lock it again
//! before touching shared state. As with any condition variable, waiters
//! re-check their predicate after waking.

use crate::diag::trace;
use crate::kernel::Kernel;
use crate::record::thread::ThreadState;
use crate::types::{CondvarId, Message, MutexId, Progress, ThreadId, Timeout, WakeReason};
use crate::wait::{QueueOrder, WaitQueue};

/// Internal state of one condition variable.
#[derive(Debug)]
pub(crate) struct CondvarRecord {
    /// Blocked waiters, highest priority first.
    pub(crate) queue: WaitQueue,
}

impl Kernel {
    /// Creates a condition variable.
    pub fn condvar_create(&mut self) -> CondvarId {
        self.lock();
        let id = CondvarId::from_arena(self.condvars.insert(CondvarRecord {
            queue: WaitQueue::new(QueueOrder::Priority),
        }));
        self.unlock();
        id
    }

    /// Releases `mutex` and waits on `condvar`.
    ///
    /// The caller must own `mutex`, and it must be its most recently locked
    /// one. On a `Signal` wakeup the thread owns the mutex again; on a
    /// `Timeout` wakeup it does not.
    pub fn condvar_wait(
        &mut self,
        condvar: CondvarId,
        mutex: MutexId,
        timeout: Timeout,
    ) -> Progress<()> {
        self.lock();
        let current = self.current;
        let owns = self
            .mutexes
            .get(mutex.arena_index())
            .is_some_and(|m| m.owner == Some(current));
        debug_assert!(owns, "condvar wait without owning the mutex");
        if !owns || !self.condvars.contains(condvar.arena_index()) {
            debug_assert!(
                self.condvars.contains(condvar.arena_index()),
                "wait on a stale condvar handle"
            );
            self.unlock();
            return Progress::Immediate(());
        }
        self.mutex_unlock_locked(mutex, false);
        let cv = self
            .condvars
            .get_mut(condvar.arena_index())
            .expect("checked above");
        cv.queue.insert(&self.threads, current);
        self.suspend_current_timed(ThreadState::WaitingCondvar { condvar, mutex }, timeout);
        self.unlock();
        Progress::Blocked
    }

    /// Wakes the best waiter, if any.
    pub fn condvar_signal(&mut self, condvar: CondvarId) {
        self.lock();
        let waiter = self
            .condvars
            .get_mut(condvar.arena_index())
            .and_then(|cv| cv.queue.pop_front());
        if let Some(thread) = waiter {
            self.grant_or_morph(thread);
        }
        self.unlock();
    }

    /// Wakes every waiter. At most one acquires the mutex immediately; the
    /// rest morph onto its wait queue and drain out one unlock at a time.
    pub fn condvar_broadcast(&mut self, condvar: CondvarId) {
        self.lock();
        let waiters = self
            .condvars
            .get_mut(condvar.arena_index())
            .map(|cv| cv.queue.drain_all())
            .unwrap_or_default();
        for thread in waiters {
            self.grant_or_morph(thread);
        }
        self.unlock();
    }

    /// Completes a condvar wakeup: grant the associated mutex if free,
    /// otherwise move the thread onto the mutex queue, still asleep. The
    /// morphed thread's timeout no longer applies — its condition has been
    /// signalled; only the mutex handover remains.
    fn grant_or_morph(&mut self, thread: ThreadId) {
        let Some(rec) = self.threads.get_mut(thread.arena_index()) else {
            debug_assert!(false, "condvar queue holds a stale thread");
            return;
        };
        let ThreadState::WaitingCondvar { mutex, .. } = rec.state else {
            debug_assert!(false, "condvar queue holds a non-waiting thread");
            return;
        };
        let mutex_free = self
            .mutexes
            .get(mutex.arena_index())
            .is_none_or(|m| m.owner.is_none());
        if mutex_free {
            if let Some(m) = self.mutexes.get_mut(mutex.arena_index()) {
                m.owner = Some(thread);
            }
            if let Some(rec) = self.threads.get_mut(thread.arena_index()) {
                rec.owned_mutexes.insert(0, mutex);
            }
            self.wakeup(thread, WakeReason::Signal(Message::NONE));
        } else {
            trace!(thread = %thread, mutex = %mutex, "condvar wakeup morphed onto mutex");
            let rec = self
                .threads
                .get_mut(thread.arena_index())
                .expect("checked above");
            if let Some(timer) = rec.timeout_timer.take() {
                self.timers.cancel(timer);
            }
            let rec = self
                .threads
                .get_mut(thread.arena_index())
                .expect("checked above");
            rec.state = ThreadState::WaitingMutex { mutex };
            let priority = rec.priority;
            if let Some(m) = self.mutexes.get_mut(mutex.arena_index()) {
                m.queue.insert(&self.threads, thread);
            }
            self.boost_owner_chain(mutex, priority);
        }
    }
}
