//! Delta-encoded virtual timers driven by the periodic tick.
//!
//! Deadlines are stored as successive differences: each entry's delta is the
//! tick count between its predecessor's expiry and its own. The tick handler
//! therefore decrements only the head delta — O(1) when nothing is due —
//! and the sum of deltas from the head to any entry is that entry's true
//! remaining deadline.
//!
//! Equal deadlines fire in arming order: insertion walks past entries whose
//! cumulative deadline is less than *or equal to* the new one, so a timer
//! armed later for the same tick lands behind the earlier one.
//!
//! Expiry actions run with the kernel lock released and reacquired around
//! each one, bounding the lock-hold time per expiring timer; actions are
//! free to call back into arming or blocking APIs.

use crate::diag::trace;
use crate::kernel::Kernel;
use crate::types::{ThreadId, TimerId};
use crate::util::Arena;
use core::fmt;
use smallvec::SmallVec;

/// Error from the timer operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    /// A zero-tick deadline was requested. "Immediate" is not a valid timer
    /// value; non-blocking paths exist for that.
    #[error("zero-tick deadline is not a valid timer value")]
    ImmediateDeadline,
    /// The handle does not name an armed timer.
    #[error("timer is not armed")]
    NotArmed,
}

/// What to do when a timer expires.
pub(crate) enum TimerAction {
    /// Resolve a wait timeout for this thread.
    ThreadTimeout(ThreadId),
    /// Run an arbitrary callback against the kernel.
    Callback(Box<dyn FnOnce(&mut Kernel) + Send>),
}

impl fmt::Debug for TimerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreadTimeout(t) => write!(f, "ThreadTimeout({t})"),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

#[derive(Debug)]
struct TimerEntry {
    /// Ticks after the predecessor's expiry (absolute for the head).
    delta: u64,
    prev: Option<TimerId>,
    next: Option<TimerId>,
    /// False once detached by the tick drain but not yet executed.
    linked: bool,
    action: TimerAction,
}

/// The delta-ordered list of pending timers.
#[derive(Debug, Default)]
pub(crate) struct TimerList {
    entries: Arena<TimerEntry>,
    head: Option<TimerId>,
}

impl TimerList {
    pub(crate) fn new() -> Self {
        Self {
            entries: Arena::new(),
            head: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the handle names a timer still linked in the delta list.
    pub(crate) fn is_armed(&self, id: TimerId) -> bool {
        self.entries
            .get(id.arena_index())
            .is_some_and(|e| e.linked)
    }

    /// Inserts a timer `delay` ticks in the future. `delay` must be >= 1.
    pub(crate) fn arm(&mut self, delay: u64, action: TimerAction) -> TimerId {
        debug_assert!(delay > 0, "zero-tick deadline");
        let mut remaining = delay.max(1);

        // Walk past entries due at or before the new deadline, keeping
        // arming order for equal deadlines.
        let mut prev: Option<TimerId> = None;
        let mut cursor = self.head;
        while let Some(at) = cursor {
            let entry = self
                .entries
                .get(at.arena_index())
                .expect("timer list links a removed entry");
            if entry.delta > remaining {
                break;
            }
            remaining -= entry.delta;
            prev = Some(at);
            cursor = entry.next;
        }

        let id = TimerId::from_arena(self.entries.insert(TimerEntry {
            delta: remaining,
            prev,
            next: cursor,
            linked: true,
            action,
        }));

        match prev {
            Some(p) => {
                self.entries
                    .get_mut(p.arena_index())
                    .expect("predecessor vanished")
                    .next = Some(id);
            }
            None => self.head = Some(id),
        }
        if let Some(n) = cursor {
            let succ = self
                .entries
                .get_mut(n.arena_index())
                .expect("successor vanished");
            succ.delta -= remaining;
            succ.prev = Some(id);
        }
        id
    }

    /// Cancels a timer, armed or detached-but-pending. Returns false for a
    /// stale handle.
    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        let Some(entry) = self.entries.get(id.arena_index()) else {
            return false;
        };
        if entry.linked {
            self.unlink(id, true);
        }
        self.entries.remove(id.arena_index()).is_some()
    }

    /// Detaches `id` from the list. With `fold`, its delta is added to the
    /// successor so every later deadline is preserved.
    fn unlink(&mut self, id: TimerId, fold: bool) {
        let (delta, prev, next) = {
            let entry = self
                .entries
                .get_mut(id.arena_index())
                .expect("unlinking a removed entry");
            entry.linked = false;
            (entry.delta, entry.prev.take(), entry.next.take())
        };
        match prev {
            Some(p) => {
                self.entries
                    .get_mut(p.arena_index())
                    .expect("predecessor vanished")
                    .next = next;
            }
            None => self.head = next,
        }
        if let Some(n) = next {
            let succ = self
                .entries
                .get_mut(n.arena_index())
                .expect("successor vanished");
            succ.prev = prev;
            if fold {
                succ.delta += delta;
            }
        }
    }

    /// Advances time by one tick, detaching every entry that became due.
    /// The due entries stay allocated (holding their actions) until taken
    /// with [`TimerList::take_fired`] or cancelled.
    pub(crate) fn advance(&mut self) -> SmallVec<[TimerId; 4]> {
        let mut due = SmallVec::new();
        let Some(head) = self.head else {
            return due;
        };
        {
            let entry = self
                .entries
                .get_mut(head.arena_index())
                .expect("timer list links a removed entry");
            entry.delta = entry.delta.saturating_sub(1);
        }
        while let Some(at) = self.head {
            let entry = self
                .entries
                .get(at.arena_index())
                .expect("timer list links a removed entry");
            if entry.delta != 0 {
                break;
            }
            self.unlink(at, false);
            due.push(at);
        }
        due
    }

    /// Takes the action of a detached entry, freeing its slot. Returns
    /// `None` if the entry was cancelled between detach and execution.
    pub(crate) fn take_fired(&mut self, id: TimerId) -> Option<TimerAction> {
        debug_assert!(
            self.entries
                .get(id.arena_index())
                .is_none_or(|e| !e.linked),
            "taking a still-armed timer"
        );
        self.entries.remove(id.arena_index()).map(|e| e.action)
    }

    /// Remaining ticks before `id` fires: the delta sum from the head.
    pub(crate) fn remaining(&self, id: TimerId) -> Option<u64> {
        if !self.is_armed(id) {
            return None;
        }
        let mut acc = 0u64;
        let mut cursor = self.head;
        while let Some(at) = cursor {
            let entry = self.entries.get(at.arena_index())?;
            acc += entry.delta;
            if at == id {
                return Some(acc);
            }
            cursor = entry.next;
        }
        None
    }
}

impl Kernel {
    /// Arms a one-shot virtual timer `delay` ticks in the future; the
    /// callback runs in ISR context with the kernel lock released and may
    /// call back into `*_from_isr` and timer APIs.
    ///
    /// # Errors
    ///
    /// [`TimerError::ImmediateDeadline`] if `delay` is zero.
    pub fn timer_arm(
        &mut self,
        delay: u64,
        callback: impl FnOnce(&mut Kernel) + Send + 'static,
    ) -> Result<TimerId, TimerError> {
        self.lock();
        let id = self.timer_arm_locked(delay, TimerAction::Callback(Box::new(callback)));
        self.unlock();
        id
    }

    /// ISR-context variant of [`Kernel::timer_arm`].
    ///
    /// # Errors
    ///
    /// [`TimerError::ImmediateDeadline`] if `delay` is zero.
    pub fn timer_arm_from_isr(
        &mut self,
        delay: u64,
        callback: impl FnOnce(&mut Kernel) + Send + 'static,
    ) -> Result<TimerId, TimerError> {
        self.lock_from_isr();
        let id = self.timer_arm_locked(delay, TimerAction::Callback(Box::new(callback)));
        self.unlock_from_isr();
        id
    }

    pub(crate) fn timer_arm_locked(
        &mut self,
        delay: u64,
        action: TimerAction,
    ) -> Result<TimerId, TimerError> {
        self.assert_locked();
        if delay == 0 {
            return Err(TimerError::ImmediateDeadline);
        }
        let id = self.timers.arm(delay, action);
        trace!(timer = %id, delay, "timer armed");
        Ok(id)
    }

    /// Disarms a previously armed timer, folding its delta into the
    /// successor so later deadlines are unaffected.
    ///
    /// # Errors
    ///
    /// [`TimerError::NotArmed`] if the handle is stale or already fired.
    pub fn timer_disarm(&mut self, id: TimerId) -> Result<(), TimerError> {
        self.lock();
        let armed = self.timers.is_armed(id);
        debug_assert!(armed, "disarming a timer that is not armed");
        let result = if armed && self.timers.cancel(id) {
            trace!(timer = %id, "timer disarmed");
            Ok(())
        } else {
            Err(TimerError::NotArmed)
        };
        self.unlock();
        result
    }

    /// Ticks until `id` fires, or `None` if it is not armed.
    pub fn timer_remaining(&self, id: TimerId) -> Option<u64> {
        self.timers.remaining(id)
    }

    /// Number of pending virtual timers.
    pub fn timers_pending(&self) -> usize {
        self.timers.len()
    }

    /// Drains due timers for this tick. Runs inside the ISR critical
    /// section; the lock is dropped and retaken around each action so a
    /// chain of simultaneous expiries cannot hold it for unbounded time.
    pub(crate) fn process_timers(&mut self) {
        self.assert_locked();
        let due = self.timers.advance();
        for id in due {
            let Some(action) = self.timers.take_fired(id) else {
                continue;
            };
            self.stats.timers_fired += 1;
            self.unlock_from_isr();
            match action {
                TimerAction::ThreadTimeout(thread) => {
                    self.lock_from_isr();
                    self.timeout_expired(thread);
                    self.unlock_from_isr();
                }
                TimerAction::Callback(callback) => callback(self),
            }
            self.lock_from_isr();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> TimerAction {
        TimerAction::Callback(Box::new(|_| {}))
    }

    fn deltas(list: &TimerList) -> Vec<u64> {
        let mut out = Vec::new();
        let mut cursor = list.head;
        while let Some(at) = cursor {
            let entry = list.entries.get(at.arena_index()).unwrap();
            out.push(entry.delta);
            cursor = entry.next;
        }
        out
    }

    #[test]
    fn deltas_encode_absolute_deadlines() {
        let mut list = TimerList::new();
        let a = list.arm(10, noop());
        let b = list.arm(25, noop());
        let c = list.arm(15, noop());
        assert_eq!(deltas(&list), vec![10, 5, 10]);
        assert_eq!(list.remaining(a), Some(10));
        assert_eq!(list.remaining(c), Some(15));
        assert_eq!(list.remaining(b), Some(25));
    }

    #[test]
    fn equal_deadlines_keep_arming_order() {
        let mut list = TimerList::new();
        let first = list.arm(50, noop());
        let second = list.arm(50, noop());
        assert_eq!(deltas(&list), vec![50, 0]);
        for _ in 0..49 {
            assert!(list.advance().is_empty());
        }
        let due = list.advance();
        assert_eq!(due.as_slice(), &[first, second]);
    }

    #[test]
    fn cancel_folds_delta_into_successor() {
        let mut list = TimerList::new();
        let _a = list.arm(10, noop());
        let b = list.arm(25, noop());
        let c = list.arm(40, noop());
        assert!(list.cancel(b));
        assert_eq!(deltas(&list), vec![10, 30]);
        assert_eq!(list.remaining(c), Some(40));
    }

    #[test]
    fn cancel_head_preserves_successor_deadline() {
        let mut list = TimerList::new();
        let a = list.arm(10, noop());
        let b = list.arm(25, noop());
        assert!(list.cancel(a));
        assert_eq!(list.remaining(b), Some(25));
        assert!(!list.cancel(a));
    }

    #[test]
    fn detached_entry_can_still_be_cancelled() {
        let mut list = TimerList::new();
        let a = list.arm(1, noop());
        let due = list.advance();
        assert_eq!(due.as_slice(), &[a]);
        // Cancel between detach and execution: the action must be gone.
        assert!(list.cancel(a));
        assert!(list.take_fired(a).is_none());
    }
}
