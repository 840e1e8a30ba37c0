//! Counting semaphores.
//!
//! The counter goes negative while threads wait: `-count` is then the
//! number of queued waiters. That invariant — `count >= 0` exactly when the
//! queue is empty — is asserted at every entry point.

use crate::diag::trace;
use crate::kernel::Kernel;
use crate::record::thread::ThreadState;
use crate::types::{Message, Progress, SemaphoreId, Timeout, WakeReason};
use crate::wait::{QueueOrder, WaitQueue, WouldBlock};

/// Internal state of one semaphore.
#[derive(Debug)]
pub(crate) struct SemaphoreRecord {
    /// Available units; negative while threads wait.
    pub(crate) count: i64,
    /// Blocked waiters.
    pub(crate) queue: WaitQueue,
}

impl Kernel {
    /// Creates a counting semaphore with `initial` units.
    ///
    /// `order` picks the wakeup policy: [`QueueOrder::Fifo`] for fairness,
    /// [`QueueOrder::Priority`] where the semaphore guards an owned
    /// resource and inversion matters.
    pub fn semaphore_create(&mut self, initial: i64, order: QueueOrder) -> SemaphoreId {
        debug_assert!(initial >= 0, "negative initial semaphore count");
        self.lock();
        let id = SemaphoreId::from_arena(self.semaphores.insert(SemaphoreRecord {
            count: initial.max(0),
            queue: WaitQueue::new(order),
        }));
        self.unlock();
        id
    }

    fn debug_check_semaphore(&self, semaphore: SemaphoreId) {
        #[cfg(debug_assertions)]
        if let Some(sem) = self.semaphores.get(semaphore.arena_index()) {
            debug_assert!(
                (sem.count >= 0) == sem.queue.is_empty(),
                "inconsistent semaphore: count {} with {} waiters",
                sem.count,
                sem.queue.len()
            );
        }
        #[cfg(not(debug_assertions))]
        let _ = semaphore;
    }

    /// Takes one unit, blocking while none is available.
    ///
    /// On [`Progress::Blocked`], the eventual outcome arrives as the
    /// thread's wakeup: `Signal` once a unit is handed over, `Timeout` if
    /// the deadline expired first, `Reset` if the semaphore was reset.
    pub fn semaphore_wait(&mut self, semaphore: SemaphoreId, timeout: Timeout) -> Progress<()> {
        self.lock();
        self.debug_check_semaphore(semaphore);
        let current = self.current;
        let Some(sem) = self.semaphores.get_mut(semaphore.arena_index()) else {
            debug_assert!(false, "wait on a stale semaphore handle");
            self.unlock();
            return Progress::Immediate(());
        };
        sem.count -= 1;
        if sem.count >= 0 {
            self.unlock();
            return Progress::Immediate(());
        }
        sem.queue.insert(&self.threads, current);
        self.suspend_current_timed(ThreadState::WaitingSemaphore { semaphore }, timeout);
        self.unlock();
        Progress::Blocked
    }

    /// Takes one unit only if immediately available.
    ///
    /// # Errors
    ///
    /// [`WouldBlock`] if no unit is available.
    pub fn semaphore_try_wait(&mut self, semaphore: SemaphoreId) -> Result<(), WouldBlock> {
        self.lock();
        self.debug_check_semaphore(semaphore);
        let result = match self.semaphores.get_mut(semaphore.arena_index()) {
            Some(sem) if sem.count > 0 => {
                sem.count -= 1;
                Ok(())
            }
            _ => Err(WouldBlock),
        };
        self.unlock();
        result
    }

    /// Releases one unit, handing it straight to the longest-waiting (or
    /// highest-priority) waiter if any.
    pub fn semaphore_signal(&mut self, semaphore: SemaphoreId) {
        self.lock();
        self.semaphore_signal_locked(semaphore, true);
        self.unlock();
    }

    /// ISR-context variant of [`Kernel::semaphore_signal`]; the preemption
    /// check runs at [`Kernel::isr_exit`].
    pub fn semaphore_signal_from_isr(&mut self, semaphore: SemaphoreId) {
        self.lock_from_isr();
        self.semaphore_signal_locked(semaphore, false);
        self.unlock_from_isr();
    }

    fn semaphore_signal_locked(&mut self, semaphore: SemaphoreId, direct_switch: bool) {
        self.debug_check_semaphore(semaphore);
        let Some(sem) = self.semaphores.get_mut(semaphore.arena_index()) else {
            debug_assert!(false, "signal on a stale semaphore handle");
            return;
        };
        sem.count += 1;
        let woken = if sem.count <= 0 {
            sem.queue.pop_front()
        } else {
            None
        };
        if let Some(thread) = woken {
            if direct_switch {
                self.wakeup(thread, WakeReason::Signal(Message::NONE));
            } else {
                self.ready_with_reason(thread, WakeReason::Signal(Message::NONE));
            }
        }
    }

    /// Resets the counter to `count`, waking every waiter with
    /// [`WakeReason::Reset`].
    pub fn semaphore_reset(&mut self, semaphore: SemaphoreId, count: i64) {
        debug_assert!(count >= 0, "negative semaphore reset count");
        self.lock();
        self.debug_check_semaphore(semaphore);
        let waiters = match self.semaphores.get_mut(semaphore.arena_index()) {
            Some(sem) => {
                sem.count = count.max(0);
                sem.queue.drain_all()
            }
            None => {
                debug_assert!(false, "reset on a stale semaphore handle");
                self.unlock();
                return;
            }
        };
        trace!(semaphore = %semaphore, woken = waiters.len(), "semaphore reset");
        for thread in waiters {
            self.ready_with_reason(thread, WakeReason::Reset);
        }
        self.reschedule();
        self.unlock();
    }

    /// The current counter value; negative means threads are waiting.
    #[must_use]
    pub fn semaphore_count(&self, semaphore: SemaphoreId) -> Option<i64> {
        self.semaphores
            .get(semaphore.arena_index())
            .map(|sem| sem.count)
    }
}
