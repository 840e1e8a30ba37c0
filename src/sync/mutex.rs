//! Mutexes with ownership transfer and priority inheritance.
//!
//! The wait queue is priority-ordered, and a contended lock raises the
//! owner's effective priority to the waiter's — transitively, across a
//! chain of owners themselves blocked on mutexes — so a high-priority
//! thread is never stalled behind an unrelated medium-priority one.
//! Unlock hands ownership directly to the best waiter; locks are released
//! strictly in the reverse order they were taken.

use crate::diag::trace;
use crate::kernel::Kernel;
use crate::record::thread::ThreadState;
use crate::types::{Message, MutexId, Priority, Progress, ThreadId, WakeReason};
use crate::wait::{QueueOrder, WaitQueue, WouldBlock};
use smallvec::SmallVec;

/// Internal state of one mutex.
#[derive(Debug)]
pub(crate) struct MutexRecord {
    /// The owning thread, if locked.
    pub(crate) owner: Option<ThreadId>,
    /// Blocked waiters, highest priority first.
    pub(crate) queue: WaitQueue,
}

impl Kernel {
    /// Creates an unlocked mutex.
    pub fn mutex_create(&mut self) -> MutexId {
        self.lock();
        let id = MutexId::from_arena(self.mutexes.insert(MutexRecord {
            owner: None,
            queue: WaitQueue::new(QueueOrder::Priority),
        }));
        self.unlock();
        id
    }

    /// Locks the mutex, blocking (untimed) while another thread owns it.
    ///
    /// Locking a mutex already owned by the caller is a contract violation:
    /// fatal in debug builds, a no-op in release builds.
    pub fn mutex_lock(&mut self, mutex: MutexId) -> Progress<()> {
        self.lock();
        let progress = self.mutex_lock_locked(mutex);
        self.unlock();
        progress
    }

    fn mutex_lock_locked(&mut self, mutex: MutexId) -> Progress<()> {
        let current = self.current;
        let Some(m) = self.mutexes.get(mutex.arena_index()) else {
            debug_assert!(false, "lock on a stale mutex handle");
            return Progress::Immediate(());
        };
        match m.owner {
            None => {
                self.grant_mutex(mutex, current);
                Progress::Immediate(())
            }
            Some(owner) if owner == current => {
                debug_assert!(false, "recursive mutex lock");
                Progress::Immediate(())
            }
            Some(_) => {
                let target = self.current_record().priority;
                self.boost_owner_chain(mutex, target);
                let m = self
                    .mutexes
                    .get_mut(mutex.arena_index())
                    .expect("checked above");
                m.queue.insert(&self.threads, current);
                self.suspend_current(ThreadState::WaitingMutex { mutex });
                Progress::Blocked
            }
        }
    }

    /// Locks the mutex only if it is free.
    ///
    /// # Errors
    ///
    /// [`WouldBlock`] if the mutex is owned.
    pub fn mutex_try_lock(&mut self, mutex: MutexId) -> Result<(), WouldBlock> {
        self.lock();
        let current = self.current;
        let free = self
            .mutexes
            .get(mutex.arena_index())
            .is_some_and(|m| m.owner.is_none());
        let result = if free {
            self.grant_mutex(mutex, current);
            Ok(())
        } else {
            Err(WouldBlock)
        };
        self.unlock();
        result
    }

    /// Records `thread` as the owner of `mutex`.
    fn grant_mutex(&mut self, mutex: MutexId, thread: ThreadId) {
        if let Some(m) = self.mutexes.get_mut(mutex.arena_index()) {
            debug_assert!(m.owner.is_none(), "granting an owned mutex");
            m.owner = Some(thread);
        }
        if let Some(rec) = self.threads.get_mut(thread.arena_index()) {
            rec.owned_mutexes.insert(0, mutex);
        }
    }

    /// Raises the priority of the owner of `mutex` to at least `target`,
    /// following the chain when that owner is itself blocked on another
    /// mutex. A boosted thread is re-sorted inside whatever priority-ordered
    /// queue currently holds it.
    pub(crate) fn boost_owner_chain(&mut self, mutex: MutexId, target: Priority) {
        let mut at = mutex;
        loop {
            let Some(owner) = self
                .mutexes
                .get(at.arena_index())
                .and_then(|m| m.owner)
            else {
                return;
            };
            let Some(rec) = self.threads.get_mut(owner.arena_index()) else {
                return;
            };
            if rec.priority >= target {
                return;
            }
            rec.priority = target;
            let state = rec.state;
            trace!(thread = %owner, %target, "priority inherited");
            match state {
                ThreadState::WaitingMutex { mutex: next } => {
                    if let Some(m) = self.mutexes.get_mut(next.arena_index()) {
                        m.queue.requeue(&self.threads, owner);
                    }
                    at = next;
                }
                ThreadState::WaitingSemaphore { semaphore } => {
                    if let Some(sem) = self.semaphores.get_mut(semaphore.arena_index()) {
                        sem.queue.requeue(&self.threads, owner);
                    }
                    return;
                }
                ThreadState::WaitingCondvar { condvar, .. } => {
                    if let Some(cv) = self.condvars.get_mut(condvar.arena_index()) {
                        cv.queue.requeue(&self.threads, owner);
                    }
                    return;
                }
                ThreadState::Ready => {
                    self.ready.requeue(&self.threads, owner);
                    return;
                }
                _ => return,
            }
        }
    }

    /// Unlocks the mutex, transferring ownership to the highest-priority
    /// waiter and shedding any priority inherited through it.
    ///
    /// Mutexes must be released in the reverse of their acquisition order;
    /// unlocking out of order, or unlocking a mutex the caller does not
    /// own, is a contract violation.
    pub fn mutex_unlock(&mut self, mutex: MutexId) {
        self.lock();
        self.mutex_unlock_locked(mutex, true);
        self.unlock();
    }

    pub(crate) fn mutex_unlock_locked(&mut self, mutex: MutexId, direct_switch: bool) {
        let current = self.current;
        let owned = self
            .mutexes
            .get(mutex.arena_index())
            .is_some_and(|m| m.owner == Some(current));
        debug_assert!(owned, "unlocking a mutex not owned by the caller");
        if !owned {
            return;
        }
        {
            let rec = self.current_record_mut();
            debug_assert_eq!(
                rec.owned_mutexes.first(),
                Some(&mutex),
                "mutexes must be unlocked in LIFO order"
            );
            rec.owned_mutexes.retain(|m| *m != mutex);
        }
        let waiter = self
            .mutexes
            .get_mut(mutex.arena_index())
            .expect("checked above")
            .queue
            .pop_front();
        match waiter {
            Some(thread) => {
                self.recompute_current_priority();
                let m = self
                    .mutexes
                    .get_mut(mutex.arena_index())
                    .expect("checked above");
                m.owner = Some(thread);
                if let Some(rec) = self.threads.get_mut(thread.arena_index()) {
                    rec.owned_mutexes.insert(0, mutex);
                }
                if direct_switch {
                    self.wakeup(thread, WakeReason::Signal(Message::NONE));
                } else {
                    self.ready_with_reason(thread, WakeReason::Signal(Message::NONE));
                }
            }
            None => {
                self.mutexes
                    .get_mut(mutex.arena_index())
                    .expect("checked above")
                    .owner = None;
            }
        }
    }

    /// Recomputes the current thread's effective priority: its base, raised
    /// to the best waiter on any mutex it still owns.
    fn recompute_current_priority(&mut self) {
        let rec = self.current_record();
        let mut priority = rec.base_priority;
        let owned: SmallVec<[MutexId; 2]> = rec.owned_mutexes.clone();
        for mutex in owned {
            let front = self
                .mutexes
                .get(mutex.arena_index())
                .and_then(|m| m.queue.front());
            if let Some(waiter) = front {
                if let Some(w) = self.threads.get(waiter.arena_index()) {
                    priority = priority.max(w.priority);
                }
            }
        }
        self.current_record_mut().priority = priority;
    }

    /// Unlocks every mutex the current thread owns, in LIFO order, then
    /// reschedules once. Useful on error paths before exiting.
    pub fn mutex_unlock_all(&mut self) {
        self.lock();
        loop {
            let Some(&mutex) = self.current_record().owned_mutexes.first() else {
                break;
            };
            self.mutex_unlock_locked(mutex, false);
        }
        let rec = self.current_record_mut();
        rec.priority = rec.base_priority;
        self.reschedule();
        self.unlock();
    }

    /// The owning thread, if the mutex is locked.
    #[must_use]
    pub fn mutex_owner(&self, mutex: MutexId) -> Option<ThreadId> {
        self.mutexes.get(mutex.arena_index()).and_then(|m| m.owner)
    }
}
