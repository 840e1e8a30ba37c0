//! Per-thread event flags.
//!
//! Every thread owns a 32-bit mask of pending events. Any thread or ISR can
//! OR flags into it; the owner waits for any or all of a mask, receives the
//! served flags as its wakeup payload, and the served flags are cleared at
//! delivery. There is no queue — the wait state itself carries the mask.

use crate::diag::trace;
use crate::kernel::Kernel;
use crate::record::thread::ThreadState;
use crate::types::{EventMask, Progress, ThreadId, Timeout, WakeReason};

impl Kernel {
    /// Delivers event flags to a thread, waking it if they satisfy its
    /// pending event wait.
    pub fn events_signal(&mut self, thread: ThreadId, events: EventMask) {
        self.lock();
        self.events_deliver_locked(thread, events);
        self.reschedule();
        self.unlock();
    }

    /// ISR-context variant of [`Kernel::events_signal`]; the preemption
    /// check runs at [`Kernel::isr_exit`].
    pub fn events_signal_from_isr(&mut self, thread: ThreadId, events: EventMask) {
        self.lock_from_isr();
        self.events_deliver_locked(thread, events);
        self.unlock_from_isr();
    }

    fn events_deliver_locked(&mut self, thread: ThreadId, events: EventMask) {
        let Some(rec) = self.threads.get_mut(thread.arena_index()) else {
            debug_assert!(false, "event signal to a stale thread handle");
            return;
        };
        rec.pending_events |= events;
        let pending = rec.pending_events;
        match rec.state {
            ThreadState::WaitingAnyEvents { events: mask } if pending.intersects(mask) => {
                let served = pending & mask;
                rec.pending_events = pending & !served;
                trace!(thread = %thread, %served, "event wait satisfied");
                self.ready_with_reason(thread, WakeReason::Events(served));
            }
            ThreadState::WaitingAllEvents { events: mask } if pending.contains(mask) => {
                rec.pending_events = pending & !mask;
                trace!(thread = %thread, served = %mask, "event wait satisfied");
                self.ready_with_reason(thread, WakeReason::Events(mask));
            }
            _ => {}
        }
    }

    /// Waits until at least one event in `events` is pending, returning the
    /// served (and cleared) flags.
    pub fn events_wait_any(&mut self, events: EventMask, timeout: Timeout) -> Progress<EventMask> {
        debug_assert!(!events.is_empty(), "waiting for an empty event mask");
        self.lock();
        let rec = self.current_record_mut();
        let served = rec.pending_events & events;
        if !served.is_empty() {
            rec.pending_events = rec.pending_events & !served;
            self.unlock();
            return Progress::Immediate(served);
        }
        self.suspend_current_timed(ThreadState::WaitingAnyEvents { events }, timeout);
        self.unlock();
        Progress::Blocked
    }

    /// Waits until every event in `events` is pending, returning (and
    /// clearing) exactly that mask.
    pub fn events_wait_all(&mut self, events: EventMask, timeout: Timeout) -> Progress<EventMask> {
        debug_assert!(!events.is_empty(), "waiting for an empty event mask");
        self.lock();
        let rec = self.current_record_mut();
        if rec.pending_events.contains(events) {
            rec.pending_events = rec.pending_events & !events;
            self.unlock();
            return Progress::Immediate(events);
        }
        self.suspend_current_timed(ThreadState::WaitingAllEvents { events }, timeout);
        self.unlock();
        Progress::Blocked
    }

    /// ORs flags into the current thread's own pending mask, returning the
    /// new mask.
    pub fn events_add(&mut self, events: EventMask) -> EventMask {
        self.lock();
        let rec = self.current_record_mut();
        rec.pending_events |= events;
        let pending = rec.pending_events;
        self.unlock();
        pending
    }

    /// Takes (returns and clears) the current thread's pending flags
    /// covered by `events`.
    pub fn events_get_and_clear(&mut self, events: EventMask) -> EventMask {
        self.lock();
        let rec = self.current_record_mut();
        let taken = rec.pending_events & events;
        rec.pending_events = rec.pending_events & !taken;
        self.unlock();
        taken
    }

    /// A thread's pending event flags.
    #[must_use]
    pub fn events_pending(&self, thread: ThreadId) -> Option<EventMask> {
        self.threads
            .get(thread.arena_index())
            .map(|rec| rec.pending_events)
    }
}
