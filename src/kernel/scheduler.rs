//! Scheduler operations: readying, voluntary sleep, wakeup and preemption.
//!
//! Selection is always "remove the head of the priority-ordered ready
//! list". The three reschedule flavors differ only in where the displaced
//! thread re-enters: behind its priority peers with a fresh quantum (slice
//! exhausted, or a yield), ahead of them keeping its remaining quantum
//! (preempted mid-slice), or not at all (it blocked).

use super::Kernel;
use crate::diag::trace;
use crate::record::thread::ThreadState;
use crate::timer::TimerAction;
use crate::types::{Priority, ThreadId, Timeout, WakeReason};

impl Kernel {
    /// Inserts a thread into the ready list at its priority-ordered
    /// position, behind peers of equal priority.
    ///
    /// I-class: the kernel lock must be held. No context switch occurs;
    /// callers running where a switch may be due must follow up with
    /// [`Kernel::reschedule`] (or rely on the ISR-exit check).
    ///
    /// Readying a thread that is already ready, current or final is a
    /// contract violation: fatal in debug builds, ignored in release
    /// builds. For a thread blocked on a synchronization object, only the
    /// object's own operations may call this, after dequeuing it.
    pub fn make_ready(&mut self, thread: ThreadId) {
        self.assert_locked();
        let Some(rec) = self.threads.get_mut(thread.arena_index()) else {
            debug_assert!(false, "make_ready on a stale thread handle");
            return;
        };
        match rec.state {
            ThreadState::Ready | ThreadState::Current | ThreadState::Final { .. } => {
                debug_assert!(false, "make_ready on a {} thread", rec.state.label());
                return;
            }
            _ => {}
        }
        rec.state = ThreadState::Ready;
        trace!(thread = %thread, "ready");
        self.ready.insert_behind(&self.threads, thread);
    }

    /// Voluntary sleep: moves the current thread into `new_state`, selects
    /// the ready-list head as the new current thread and switches to it,
    /// atomically under the lock.
    ///
    /// The caller must already have enqueued the thread on whatever object
    /// will wake it; nothing between that enqueue and this switch is
    /// observable from outside the critical section, which is what makes
    /// lost wakeups impossible.
    pub(crate) fn suspend_current(&mut self, new_state: ThreadState) {
        self.assert_thread_locked();
        debug_assert!(new_state.is_waiting(), "suspending into a runnable state");
        debug_assert!(self.current != self.idle, "the idle thread may not block");
        let full = self.full_quantum();
        let rec = self
            .threads
            .get_mut(self.current.arena_index())
            .expect("current thread has no record");
        trace!(thread = %self.current, state = %new_state, "suspending");
        rec.state = new_state;
        rec.quantum = full;
        rec.wake = None;
        let next = self.take_next();
        self.switch_to(next);
    }

    /// [`Kernel::suspend_current`] plus a timeout timer when the deadline is
    /// finite. The timer resolves the wait through
    /// [`Kernel::timeout_expired`] unless a signal cancels it first.
    pub(crate) fn suspend_current_timed(&mut self, new_state: ThreadState, timeout: Timeout) {
        if let Timeout::After(ticks) = timeout {
            let thread = self.current;
            let timer = self
                .timers
                .arm(ticks.get(), TimerAction::ThreadTimeout(thread));
            self.threads
                .get_mut(thread.arena_index())
                .expect("current thread has no record")
                .timeout_timer = Some(timer);
        }
        self.suspend_current(new_state);
    }

    /// Records the wakeup outcome on a blocked thread and cancels its
    /// timeout timer. Returns the thread's effective priority, or `None`
    /// for a stale handle.
    fn deliver_wake(&mut self, thread: ThreadId, reason: WakeReason) -> Option<Priority> {
        let Some(rec) = self.threads.get_mut(thread.arena_index()) else {
            debug_assert!(false, "wakeup on a stale thread handle");
            return None;
        };
        debug_assert!(
            rec.state.is_waiting(),
            "wakeup on a {} thread",
            rec.state.label()
        );
        rec.wake = Some(reason);
        let priority = rec.priority;
        if let Some(timer) = rec.timeout_timer.take() {
            self.timers.cancel(timer);
        }
        self.stats.wakeups += 1;
        trace!(thread = %thread, %reason, "wakeup");
        Some(priority)
    }

    /// Wakes a blocked thread without ever switching: it only re-enters the
    /// ready list. Used by drain-style paths (reset, broadcast, event
    /// delivery) that follow up with one [`Kernel::reschedule`].
    pub(crate) fn ready_with_reason(&mut self, thread: ThreadId, reason: WakeReason) {
        self.assert_locked();
        if self.deliver_wake(thread, reason).is_some() {
            self.make_ready(thread);
        }
    }

    /// Wakes a blocked thread with `reason`, cancelling any armed timeout.
    ///
    /// From thread context, if the woken thread outranks the caller the
    /// switch happens here: the caller re-enters the ready list behind its
    /// peers and the woken thread becomes current without a trip through
    /// the ready list. From ISR context the thread is only readied; the
    /// preemption check at ISR exit completes the job.
    pub(crate) fn wakeup(&mut self, thread: ThreadId, reason: WakeReason) {
        self.assert_locked();
        let Some(woken_priority) = self.deliver_wake(thread, reason) else {
            return;
        };
        let current_priority = self.current_record().priority;
        if self.lock.in_isr() || woken_priority <= current_priority {
            self.make_ready(thread);
        } else {
            let previous = self.current;
            let rec = self
                .threads
                .get_mut(previous.arena_index())
                .expect("current thread has no record");
            rec.state = ThreadState::Ready;
            self.ready.insert_behind(&self.threads, previous);
            let woken = self.threads.get_mut(thread.arena_index()).expect("checked");
            woken.state = ThreadState::Ready;
            self.switch_to(thread);
        }
    }

    /// Voluntary reschedule: if the ready-list head strictly outranks the
    /// current thread, switch to it, re-entering the current thread ahead of
    /// its priority peers with its remaining quantum.
    ///
    /// S-class: thread context with the kernel lock held. Required after
    /// I-class calls such as [`Kernel::make_ready`] when running in the
    /// thread that should yield the processor.
    pub fn reschedule(&mut self) {
        self.assert_thread_locked();
        let current = self.current_record().priority;
        if self
            .ready
            .head_priority(&self.threads)
            .is_some_and(|head| head > current)
        {
            self.reschedule_ahead();
        }
    }

    /// Yields the processor to the next thread of equal or higher priority,
    /// re-entering the ready list behind peers. A no-op if no such thread
    /// is ready.
    pub fn yield_now(&mut self) {
        self.lock();
        let current = self.current_record().priority;
        if self
            .ready
            .head_priority(&self.threads)
            .is_some_and(|head| head >= current)
        {
            self.reschedule_behind();
        }
        self.unlock();
    }

    /// The ISR-exit preemption test: strictly-higher priority always
    /// preempts; equal priority preempts only once the running thread's
    /// quantum is exhausted.
    pub(crate) fn preemption_required(&self) -> bool {
        let Some(head) = self.ready.head_priority(&self.threads) else {
            return false;
        };
        let rec = self.current_record();
        if self.config.quantum.is_some() && rec.quantum == 0 {
            head >= rec.priority
        } else {
            head > rec.priority
        }
    }

    /// Preempts the current thread from the ISR-exit path. An exhausted
    /// slice re-enters behind its peers with a fresh quantum; an unexpired
    /// one re-enters ahead, keeping the remainder.
    pub(crate) fn preempt(&mut self) {
        if self.config.quantum.is_some() && self.current_record().quantum == 0 {
            self.reschedule_behind();
        } else {
            self.reschedule_ahead();
        }
    }

    fn reschedule_behind(&mut self) {
        self.assert_locked();
        let previous = self.current;
        let next = self.take_next();
        let full = self.full_quantum();
        let rec = self
            .threads
            .get_mut(previous.arena_index())
            .expect("current thread has no record");
        rec.state = ThreadState::Ready;
        rec.quantum = full;
        self.ready.insert_behind(&self.threads, previous);
        self.switch_to(next);
    }

    fn reschedule_ahead(&mut self) {
        self.assert_locked();
        let previous = self.current;
        let next = self.take_next();
        let rec = self
            .threads
            .get_mut(previous.arena_index())
            .expect("current thread has no record");
        rec.state = ThreadState::Ready;
        self.ready.insert_ahead(&self.threads, previous);
        self.switch_to(next);
    }

    /// Removes the ready-list head. The idle thread keeps the list
    /// non-empty whenever the current thread may block.
    pub(super) fn take_next(&mut self) -> ThreadId {
        self.ready
            .pop_highest()
            .expect("ready list empty: idle thread invariant violated")
    }

    /// Commits `next` as the current thread and hands the switch to the
    /// context port.
    pub(crate) fn switch_to(&mut self, next: ThreadId) {
        self.assert_locked();
        if let Some(rec) = self.threads.get_mut(next.arena_index()) {
            debug_assert_eq!(rec.id, next, "descriptor does not match its handle");
            rec.state = ThreadState::Current;
        }
        let previous = core::mem::replace(&mut self.current, next);
        self.stats.context_switches += 1;
        trace!(from = %previous, to = %next, "context switch");
        self.port.switch(previous, next);
    }

    pub(crate) fn full_quantum(&self) -> u32 {
        self.config.quantum.unwrap_or(0)
    }
}
