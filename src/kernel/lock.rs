//! Kernel-lock and ISR-entry discipline.
//!
//! On the target this is interrupt masking up to a priority ceiling; on the
//! host it is runtime-checked discipline state. Two acquisition pairs exist
//! because an ISR already runs above the ceiling and must not re-mask:
//! [`Kernel::lock`]/[`Kernel::unlock`] from thread context,
//! [`Kernel::lock_from_isr`]/[`Kernel::unlock_from_isr`] between
//! [`Kernel::isr_enter`] and [`Kernel::isr_exit`]. Internal entry points
//! assert their caller class in debug builds, matching the "lock already
//! held" vs "acquires its own lock" split of the public contract.

use super::Kernel;
use crate::diag::trace;

/// Discipline state: whether the kernel critical section is held and how
/// deeply ISRs are nested.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct LockState {
    critical: bool,
    isr_nesting: u32,
}

impl LockState {
    pub(crate) const fn new() -> Self {
        Self {
            critical: false,
            isr_nesting: 0,
        }
    }

    pub(crate) const fn in_critical(self) -> bool {
        self.critical
    }

    pub(crate) const fn in_isr(self) -> bool {
        self.isr_nesting > 0
    }
}

impl Kernel {
    /// Enters the kernel critical section from thread context.
    pub fn lock(&mut self) {
        debug_assert!(!self.lock.critical, "kernel lock is not recursive");
        debug_assert!(!self.lock.in_isr(), "use lock_from_isr inside an ISR");
        self.lock.critical = true;
    }

    /// Leaves the kernel critical section from thread context.
    pub fn unlock(&mut self) {
        debug_assert!(self.lock.critical, "unlock without lock");
        debug_assert!(!self.lock.in_isr(), "use unlock_from_isr inside an ISR");
        self.lock.critical = false;
    }

    /// Enters the kernel critical section from ISR context.
    pub fn lock_from_isr(&mut self) {
        debug_assert!(self.lock.in_isr(), "lock_from_isr outside an ISR");
        debug_assert!(!self.lock.critical, "kernel lock is not recursive");
        self.lock.critical = true;
    }

    /// Leaves the kernel critical section from ISR context.
    pub fn unlock_from_isr(&mut self) {
        debug_assert!(self.lock.in_isr(), "unlock_from_isr outside an ISR");
        debug_assert!(self.lock.critical, "unlock without lock");
        self.lock.critical = false;
    }

    /// Marks entry into an interrupt handler.
    ///
    /// The hardware cannot deliver a masked interrupt while the kernel lock
    /// is held, so entering with the lock held is a discipline violation.
    pub fn isr_enter(&mut self) {
        debug_assert!(
            !self.lock.critical,
            "interrupt delivered inside the kernel critical section"
        );
        self.lock.isr_nesting += 1;
    }

    /// Marks exit from an interrupt handler.
    ///
    /// At the outermost exit the scheduler runs its preemption check: if a
    /// readied thread outranks the interrupted one (or ties it with an
    /// exhausted quantum), the switch happens here, before control returns
    /// to the interrupted thread.
    pub fn isr_exit(&mut self) {
        debug_assert!(self.lock.isr_nesting > 0, "isr_exit without isr_enter");
        debug_assert!(!self.lock.critical, "isr_exit inside the critical section");
        self.lock.isr_nesting -= 1;
        if self.lock.isr_nesting == 0 {
            self.lock.critical = true;
            if self.preemption_required() {
                trace!(current = %self.current, "preempting at ISR exit");
                self.stats.preemptions += 1;
                self.preempt();
            }
            self.lock.critical = false;
        }
    }

    /// Debug check: the critical section must be held (any context).
    pub(crate) fn assert_locked(&self) {
        debug_assert!(
            self.lock.in_critical(),
            "kernel lock must be held at this entry point"
        );
    }

    /// Debug check: the critical section must be held from thread context.
    pub(crate) fn assert_thread_locked(&self) {
        self.assert_locked();
        debug_assert!(
            !self.lock.in_isr(),
            "this entry point must not be used from an ISR"
        );
    }
}
