//! The kernel state machine: thread pool, ready list, timers, lock
//! discipline and the public thread API.
//!
//! One [`Kernel`] value owns all scheduler state. The embedding drives it
//! from exactly two directions: thread-context calls made "as" the current
//! thread, and ISR-context calls bracketed by [`Kernel::isr_enter`] /
//! [`Kernel::isr_exit`] — most importantly [`Kernel::tick_interrupt`],
//! which a hardware timer must invoke at a fixed frequency.

mod lock;
pub mod port;
mod ready_queue;
mod scheduler;
mod stats;

pub use port::{ContextPort, NullPort};
pub use stats::KernelStats;

use crate::diag::{debug, trace};
use crate::record::thread::{ThreadConfig, ThreadRecord, ThreadState};
use crate::sync::condvar::CondvarRecord;
use crate::sync::mailbox::MailboxRecord;
use crate::sync::mutex::MutexRecord;
use crate::sync::semaphore::SemaphoreRecord;
use crate::timer::TimerList;
use crate::types::{Message, Priority, Progress, ThreadId, Tick, Timeout, WakeReason};
use crate::util::Arena;
use core::fmt;
use lock::LockState;
use ready_queue::ReadyQueue;

/// Build-time parameters of a kernel instance.
#[derive(Clone, Copy, Debug)]
pub struct KernelConfig {
    pub(crate) quantum: Option<u32>,
    pub(crate) max_threads: usize,
    pub(crate) main_priority: Priority,
}

impl KernelConfig {
    /// Round-robin quantum of 20 ticks, 32 thread slots, main thread at
    /// [`Priority::NORMAL`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            quantum: Some(20),
            max_threads: 32,
            main_priority: Priority::NORMAL,
        }
    }

    /// Sets the round-robin quantum in ticks; `None` disables round-robin
    /// entirely, leaving strict priority preemption only.
    #[must_use]
    pub const fn with_quantum(mut self, quantum: Option<u32>) -> Self {
        self.quantum = quantum;
        self
    }

    /// Bounds the thread pool, counting the main and idle threads.
    #[must_use]
    pub const fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Priority of the boot ("main") thread.
    #[must_use]
    pub const fn with_main_priority(mut self, priority: Priority) -> Self {
        self.main_priority = priority;
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Error from [`Kernel::spawn`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    /// The thread pool is at its configured limit.
    #[error("thread pool exhausted: limit {limit}")]
    PoolExhausted {
        /// The configured pool size.
        limit: usize,
    },
}

/// The concurrency core: scheduler, virtual timers and every
/// synchronization object, behind one mutable owner.
pub struct Kernel {
    pub(crate) config: KernelConfig,
    pub(crate) threads: Arena<ThreadRecord>,
    pub(crate) semaphores: Arena<SemaphoreRecord>,
    pub(crate) mutexes: Arena<MutexRecord>,
    pub(crate) condvars: Arena<CondvarRecord>,
    pub(crate) mailboxes: Arena<MailboxRecord>,
    pub(crate) ready: ReadyQueue,
    pub(crate) timers: TimerList,
    pub(crate) current: ThreadId,
    pub(crate) idle: ThreadId,
    main: ThreadId,
    pub(crate) now: Tick,
    pub(crate) lock: LockState,
    pub(crate) port: Box<dyn ContextPort>,
    pub(crate) stats: KernelStats,
}

impl Kernel {
    /// Boots a kernel with a [`NullPort`].
    #[must_use]
    pub fn new(config: KernelConfig) -> Self {
        Self::with_port(config, Box::new(NullPort))
    }

    /// Boots a kernel delegating context handling to `port`.
    ///
    /// The calling context becomes the "main" thread (already `Current`),
    /// and an idle thread at [`Priority::IDLE`] is created so the ready list
    /// is never empty when the current thread blocks.
    #[must_use]
    pub fn with_port(config: KernelConfig, port: Box<dyn ContextPort>) -> Self {
        let placeholder = ThreadId::from_raw_parts(u32::MAX, u32::MAX);
        let mut kernel = Self {
            config,
            threads: Arena::with_capacity(config.max_threads),
            semaphores: Arena::new(),
            mutexes: Arena::new(),
            condvars: Arena::new(),
            mailboxes: Arena::new(),
            ready: ReadyQueue::new(),
            timers: TimerList::new(),
            current: placeholder,
            idle: placeholder,
            main: placeholder,
            now: Tick::ZERO,
            lock: LockState::new(),
            port,
            stats: KernelStats::default(),
        };

        kernel.lock();
        let main_config = ThreadConfig::new("main").with_priority(kernel.config.main_priority);
        let main = kernel
            .spawn_locked(&main_config)
            .expect("thread pool too small for the boot threads");
        kernel
            .threads
            .get_mut(main.arena_index())
            .expect("just created")
            .state = ThreadState::Current;
        kernel.current = main;
        kernel.main = main;

        let idle_config = ThreadConfig {
            name: "idle",
            priority: Priority::IDLE,
            stack_size: 256,
        };
        let quantum = kernel.full_quantum();
        let idle = ThreadId::from_arena(kernel.threads.insert_with(|ix| {
            ThreadRecord::new(ThreadId::from_arena(ix), &idle_config, quantum)
        }));
        kernel.port.init(idle, &idle_config);
        kernel.stats.threads_spawned += 1;
        kernel.idle = idle;
        kernel.make_ready(idle);
        kernel.unlock();

        debug!(main = %main, idle = %idle, "kernel booted");
        kernel
    }

    // ------------------------------------------------------------------
    // Thread lifecycle
    // ------------------------------------------------------------------

    /// Creates a thread in the `Suspended` state; it runs only after
    /// [`Kernel::resume`]. The descriptor comes from the kernel's bounded
    /// pool and the creator holds its one reference.
    ///
    /// # Errors
    ///
    /// [`SpawnError::PoolExhausted`] when the pool limit is reached — a
    /// normal resource error, never fatal to the kernel.
    pub fn spawn(&mut self, config: ThreadConfig) -> Result<ThreadId, SpawnError> {
        self.lock();
        let result = self.spawn_locked(&config);
        self.unlock();
        result
    }

    fn spawn_locked(&mut self, config: &ThreadConfig) -> Result<ThreadId, SpawnError> {
        self.assert_locked();
        if self.threads.len() >= self.config.max_threads {
            return Err(SpawnError::PoolExhausted {
                limit: self.config.max_threads,
            });
        }
        let mut config = *config;
        if config.priority == Priority::IDLE {
            debug_assert!(false, "Priority::IDLE is reserved for the idle thread");
            config.priority = Priority::LOWEST;
        }
        let quantum = self.full_quantum();
        let id = ThreadId::from_arena(
            self.threads
                .insert_with(|ix| ThreadRecord::new(ThreadId::from_arena(ix), &config, quantum)),
        );
        self.stats.threads_spawned += 1;
        self.port.init(id, &config);
        debug!(thread = %id, name = config.name, priority = %config.priority, "spawned");
        Ok(id)
    }

    /// Makes a `Suspended` thread ready and reschedules if it outranks the
    /// caller.
    pub fn resume(&mut self, thread: ThreadId) {
        self.lock();
        let suspended = matches!(self.thread_state(thread), Some(ThreadState::Suspended));
        debug_assert!(suspended, "resume on a thread that is not suspended");
        if suspended {
            self.make_ready(thread);
            self.reschedule();
        }
        self.unlock();
    }

    /// ISR-context variant of [`Kernel::resume`]; the switch, if due,
    /// happens at [`Kernel::isr_exit`].
    pub fn resume_from_isr(&mut self, thread: ThreadId) {
        self.lock_from_isr();
        let suspended = matches!(self.thread_state(thread), Some(ThreadState::Suspended));
        debug_assert!(suspended, "resume on a thread that is not suspended");
        if suspended {
            self.make_ready(thread);
        }
        self.unlock_from_isr();
    }

    /// Suspends the current thread for `ticks` ticks of the periodic
    /// interrupt.
    pub fn sleep(&mut self, ticks: u64) -> Progress<()> {
        if ticks == 0 {
            debug_assert!(false, "zero-tick sleep");
            return Progress::Immediate(());
        }
        self.lock();
        self.suspend_current_timed(ThreadState::Sleeping, Timeout::after(ticks));
        self.unlock();
        Progress::Blocked
    }

    /// Suspends the current thread until the absolute tick `deadline`.
    /// A deadline not in the future completes immediately.
    pub fn sleep_until(&mut self, deadline: Tick) -> Progress<()> {
        let delay = self.now.until(deadline);
        if delay == 0 {
            return Progress::Immediate(());
        }
        self.sleep(delay)
    }

    /// Terminates the current thread with `exit` as its code.
    ///
    /// Joiners are readied with the exit code as their wakeup message and
    /// each consumes one reference, exactly as a direct [`Kernel::join`]
    /// completion would. The descriptor itself survives in the pool until
    /// its reference count reaches zero.
    pub fn exit_current(&mut self, exit: Message) {
        self.lock();
        let current = self.current;
        debug_assert!(current != self.idle, "the idle thread may not exit");
        let joiners = {
            let rec = self
                .threads
                .get_mut(current.arena_index())
                .expect("current thread has no record");
            debug_assert!(
                rec.owned_mutexes.is_empty(),
                "thread exiting while owning mutexes"
            );
            rec.state = ThreadState::Final { exit };
            core::mem::take(&mut rec.joiners)
        };
        debug!(thread = %current, %exit, joiners = joiners.len(), "exit");
        for joiner in joiners {
            if let Some(rec) = self.threads.get_mut(joiner.arena_index()) {
                debug_assert!(
                    matches!(rec.state, ThreadState::WaitingJoin { target } if target == current),
                    "joiner is not waiting on the exiting thread"
                );
                rec.wake = Some(WakeReason::Signal(exit));
                self.stats.wakeups += 1;
                self.make_ready(joiner);
            }
            self.release_locked(current);
        }
        self.reclaim_locked(current);
        let next = self.take_next();
        self.switch_to(next);
        self.unlock();
    }

    /// Waits for `thread` to terminate, returning its exit code. Completes
    /// immediately for an already-`Final` thread; either way one reference
    /// to it is consumed.
    pub fn join(&mut self, thread: ThreadId) -> Progress<Message> {
        self.lock();
        if thread == self.current {
            debug_assert!(false, "thread joining itself");
            self.unlock();
            return Progress::Immediate(Message::NONE);
        }
        let Some(rec) = self.threads.get(thread.arena_index()) else {
            debug_assert!(false, "join on a stale thread handle");
            self.unlock();
            return Progress::Immediate(Message::NONE);
        };
        if let ThreadState::Final { exit } = rec.state {
            self.release_locked(thread);
            self.unlock();
            return Progress::Immediate(exit);
        }
        let current = self.current;
        self.threads
            .get_mut(thread.arena_index())
            .expect("checked above")
            .joiners
            .push(current);
        self.suspend_current(ThreadState::WaitingJoin { target: thread });
        self.unlock();
        Progress::Blocked
    }

    /// Takes an additional reference to a thread's descriptor.
    pub fn retain(&mut self, thread: ThreadId) {
        self.lock();
        if let Some(rec) = self.threads.get_mut(thread.arena_index()) {
            rec.refs += 1;
        } else {
            debug_assert!(false, "retain on a stale thread handle");
        }
        self.unlock();
    }

    /// Drops one reference to a thread's descriptor. A `Final` descriptor
    /// with no references left returns to the pool.
    pub fn release(&mut self, thread: ThreadId) {
        self.lock();
        self.release_locked(thread);
        self.unlock();
    }

    fn release_locked(&mut self, thread: ThreadId) {
        if let Some(rec) = self.threads.get_mut(thread.arena_index()) {
            debug_assert!(rec.refs > 0, "release without a matching reference");
            rec.refs = rec.refs.saturating_sub(1);
        }
        self.reclaim_locked(thread);
    }

    fn reclaim_locked(&mut self, thread: ThreadId) {
        let dead = self
            .threads
            .get(thread.arena_index())
            .is_some_and(|rec| rec.refs == 0 && rec.state.is_final());
        if dead {
            self.threads.remove(thread.arena_index());
            trace!(thread = %thread, "descriptor reclaimed");
        }
    }

    /// Asks a thread to terminate. Purely cooperative: the target observes
    /// the request through [`Kernel::terminate_requested`] and exits on its
    /// own schedule.
    pub fn request_terminate(&mut self, thread: ThreadId) {
        self.lock();
        if let Some(rec) = self.threads.get_mut(thread.arena_index()) {
            rec.terminate_requested = true;
        }
        self.unlock();
    }

    /// True if someone asked the current thread to terminate.
    #[must_use]
    pub fn terminate_requested(&self) -> bool {
        self.current_record().terminate_requested
    }

    // ------------------------------------------------------------------
    // Periodic tick
    // ------------------------------------------------------------------

    /// The periodic tick entry point, to be invoked by a hardware timer ISR
    /// at a fixed frequency. Drives round-robin quantum accounting and
    /// virtual-timer expiry, and performs the preemption check on the way
    /// out.
    pub fn tick_interrupt(&mut self) {
        self.isr_enter();
        self.lock_from_isr();
        self.now = self.now.next();
        self.stats.ticks += 1;
        if self.config.quantum.is_some() {
            let rec = self
                .threads
                .get_mut(self.current.arena_index())
                .expect("current thread has no record");
            rec.quantum = rec.quantum.saturating_sub(1);
        }
        self.process_timers();
        self.unlock_from_isr();
        self.isr_exit();
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// The thread whose context is live on the processor.
    #[must_use]
    pub fn current(&self) -> ThreadId {
        self.current
    }

    /// The boot thread.
    #[must_use]
    pub fn main_thread(&self) -> ThreadId {
        self.main
    }

    /// The idle thread.
    #[must_use]
    pub fn idle_thread(&self) -> ThreadId {
        self.idle
    }

    /// Kernel time, in ticks since boot.
    #[must_use]
    pub fn now(&self) -> Tick {
        self.now
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> KernelStats {
        self.stats
    }

    /// A thread's lifecycle state, or `None` for a stale handle.
    #[must_use]
    pub fn thread_state(&self, thread: ThreadId) -> Option<ThreadState> {
        self.threads.get(thread.arena_index()).map(|rec| rec.state)
    }

    /// A thread's effective priority (base priority plus any inheritance).
    #[must_use]
    pub fn thread_priority(&self, thread: ThreadId) -> Option<Priority> {
        self.threads
            .get(thread.arena_index())
            .map(|rec| rec.priority)
    }

    /// A thread's diagnostic name.
    #[must_use]
    pub fn thread_name(&self, thread: ThreadId) -> Option<&'static str> {
        self.threads.get(thread.arena_index()).map(|rec| rec.name)
    }

    /// The stack size hint a thread was created with.
    #[must_use]
    pub fn thread_stack_size(&self, thread: ThreadId) -> Option<usize> {
        self.threads
            .get(thread.arena_index())
            .map(|rec| rec.stack_size)
    }

    /// Outcome of a thread's most recent suspension, written by whichever
    /// side woke it. Remains readable until the thread blocks again.
    #[must_use]
    pub fn last_wake(&self, thread: ThreadId) -> Option<WakeReason> {
        self.threads
            .get(thread.arena_index())
            .and_then(|rec| rec.wake)
    }

    /// Takes the current thread's pending wakeup outcome.
    pub fn take_wake_reason(&mut self) -> Option<WakeReason> {
        let current = self.current;
        self.threads
            .get_mut(current.arena_index())
            .and_then(|rec| rec.wake.take())
    }

    /// Ready-list contents, highest priority first.
    #[must_use]
    pub fn ready_order(&self) -> Vec<ThreadId> {
        self.ready.iter().collect()
    }

    pub(crate) fn current_record(&self) -> &ThreadRecord {
        self.threads
            .get(self.current.arena_index())
            .expect("current thread has no record")
    }

    pub(crate) fn current_record_mut(&mut self) -> &mut ThreadRecord {
        self.threads
            .get_mut(self.current.arena_index())
            .expect("current thread has no record")
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("now", &self.now)
            .field("current", &self.current)
            .field("threads", &self.threads.len())
            .field("ready", &self.ready.len())
            .field("timers", &self.timers.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
