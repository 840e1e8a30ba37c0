//! Kernel activity counters.

/// Monotonic counters for scheduler and timer activity.
///
/// Cheap enough to maintain unconditionally; read them with
/// [`crate::Kernel::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KernelStats {
    /// Context switches performed, voluntary and preemptive.
    pub context_switches: u64,
    /// Preemptions decided at ISR exit.
    pub preemptions: u64,
    /// Ticks of the periodic interrupt handled.
    pub ticks: u64,
    /// Virtual timers that fired.
    pub timers_fired: u64,
    /// Wakeups delivered to blocked threads.
    pub wakeups: u64,
    /// Threads created since boot.
    pub threads_spawned: u64,
}
