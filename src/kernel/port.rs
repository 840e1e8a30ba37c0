//! Contract for the processor-specific context-switch layer.

use crate::record::thread::ThreadConfig;
use crate::types::ThreadId;

/// The processor-specific layer the kernel delegates context handling to.
///
/// The kernel owns every scheduling decision but never touches a stack or a
/// register: `switch` is called exactly once per context switch, inside the
/// kernel critical section, after the bookkeeping for both threads has been
/// committed. A firmware port swaps stacks here; the test port records the
/// sequence.
///
/// The saved-context handle of each thread is owned by the port, keyed by
/// [`ThreadId`]; the kernel guarantees it never asks to switch to a thread
/// it has not previously announced through `init`, with the exception of the
/// boot thread, which is the context already live when the kernel is built.
pub trait ContextPort: Send {
    /// A thread was created; allocate and prepare its execution context.
    fn init(&mut self, thread: ThreadId, config: &ThreadConfig) {
        let _ = (thread, config);
    }

    /// Save `from`'s context and make `to`'s context live.
    fn switch(&mut self, from: ThreadId, to: ThreadId) {
        let _ = (from, to);
    }
}

/// A port that does nothing, for pure state-machine use of the kernel.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullPort;

impl ContextPort for NullPort {}
