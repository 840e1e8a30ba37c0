//! Shared helpers for unit and integration tests.
//!
//! - A [`RecordingPort`] that captures every context switch for assertion
//! - Kernel constructors with test-friendly configurations
//! - A tick-driving helper
//!
//! # Example
//! ```
//! use tickos::test_utils::{recording_kernel, run_ticks};
//! use tickos::KernelConfig;
//!
//! let (mut k, log) = recording_kernel(KernelConfig::default());
//! run_ticks(&mut k, 3);
//! assert_eq!(k.stats().ticks, 3);
//! assert!(log.switches().is_empty());
//! ```

use crate::kernel::{ContextPort, Kernel, KernelConfig};
use crate::record::thread::ThreadConfig;
use crate::types::{Priority, ThreadId};
use std::sync::{Arc, Mutex};

/// Shared view of the switch sequence recorded by a [`RecordingPort`].
#[derive(Clone, Debug, Default)]
pub struct SwitchLog {
    events: Arc<Mutex<Vec<(ThreadId, ThreadId)>>>,
}

impl SwitchLog {
    /// All `(from, to)` switches seen so far, in order.
    #[must_use]
    pub fn switches(&self) -> Vec<(ThreadId, ThreadId)> {
        self.events.lock().expect("switch log poisoned").clone()
    }

    /// Number of switches seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().expect("switch log poisoned").len()
    }

    /// True if no switch happened yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().expect("switch log poisoned").clear();
    }
}

/// A context port that records the switch sequence.
#[derive(Debug, Default)]
pub struct RecordingPort {
    log: SwitchLog,
}

impl RecordingPort {
    /// Creates a port and the log handle to observe it through.
    #[must_use]
    pub fn new() -> (Self, SwitchLog) {
        let log = SwitchLog::default();
        (Self { log: log.clone() }, log)
    }
}

impl ContextPort for RecordingPort {
    fn switch(&mut self, from: ThreadId, to: ThreadId) {
        self.log
            .events
            .lock()
            .expect("switch log poisoned")
            .push((from, to));
    }
}

/// A kernel with the default configuration and a null port.
#[must_use]
pub fn test_kernel() -> Kernel {
    Kernel::new(KernelConfig::default())
}

/// A kernel with round-robin disabled, for tests that want pure priority
/// scheduling without quantum effects.
#[must_use]
pub fn strict_priority_kernel() -> Kernel {
    Kernel::new(KernelConfig::default().with_quantum(None))
}

/// A kernel wired to a [`RecordingPort`], plus the log handle.
#[must_use]
pub fn recording_kernel(config: KernelConfig) -> (Kernel, SwitchLog) {
    let (port, log) = RecordingPort::new();
    (Kernel::with_port(config, Box::new(port)), log)
}

/// Spawns and immediately resumes a thread at the given priority level.
pub fn spawn_ready(kernel: &mut Kernel, name: &'static str, priority: u8) -> ThreadId {
    let thread = kernel
        .spawn(ThreadConfig::new(name).with_priority(Priority::new(priority)))
        .expect("test thread pool exhausted");
    kernel.resume(thread);
    thread
}

/// Drives the periodic tick `n` times.
pub fn run_ticks(kernel: &mut Kernel, n: u64) {
    for _ in 0..n {
        kernel.tick_interrupt();
    }
}
