//! Scheduler conformance: strict priority selection, FIFO stability,
//! sleep/wakeup timing, round-robin quantum behavior.

mod common;

use common::init_test_logging;
use tickos::test_utils::{recording_kernel, run_ticks, spawn_ready, strict_priority_kernel};
use tickos::types::Priority;
use tickos::{KernelConfig, ThreadConfig, ThreadState, WakeReason};

// ============================================================================
// Priority selection
// ============================================================================

#[test]
fn strict_priority_order_across_three_threads() {
    init_test_logging();
    let mut k = strict_priority_kernel();
    let t3 = spawn_ready(&mut k, "t3", 3);
    let t2 = spawn_ready(&mut k, "t2", 2);
    let t1 = spawn_ready(&mut k, "t1", 1);

    // All below main's priority: ready list holds them sorted, idle last.
    assert_eq!(k.ready_order(), vec![t3, t2, t1, k.idle_thread()]);

    // Main steps aside; the scheduler must pick 3, then 2, then 1.
    assert!(k.sleep(1_000).is_blocked());
    assert_eq!(k.current(), t3);
    k.exit_current(0.into());
    assert_eq!(k.current(), t2);
    k.exit_current(0.into());
    assert_eq!(k.current(), t1);
    k.exit_current(0.into());
    assert_eq!(k.current(), k.idle_thread());
}

#[test]
fn higher_priority_spawn_preempts_on_resume() {
    init_test_logging();
    let (mut k, log) = recording_kernel(KernelConfig::default());
    let main = k.main_thread();
    let hi = spawn_ready(&mut k, "hi", 200);
    assert_eq!(k.current(), hi);
    assert_eq!(k.thread_state(main), Some(ThreadState::Ready));
    assert_eq!(log.switches(), vec![(main, hi)]);
}

#[test]
fn equal_priority_arrivals_are_fifo() {
    init_test_logging();
    let mut k = strict_priority_kernel();
    let a = spawn_ready(&mut k, "a", 50);
    let b = spawn_ready(&mut k, "b", 50);
    let c = spawn_ready(&mut k, "c", 50);
    assert_eq!(k.ready_order(), vec![a, b, c, k.idle_thread()]);

    assert!(k.sleep(1_000).is_blocked());
    assert_eq!(k.current(), a);
}

// ============================================================================
// Sleep timing
// ============================================================================

#[test]
fn sleep_wakes_on_the_hundredth_tick_exactly() {
    init_test_logging();
    let mut k = strict_priority_kernel();
    let main = k.main_thread();

    assert!(k.sleep(100).is_blocked());
    assert_eq!(k.current(), k.idle_thread());

    run_ticks(&mut k, 99);
    assert_eq!(k.thread_state(main), Some(ThreadState::Sleeping));

    k.tick_interrupt();
    assert_eq!(k.current(), main);
    assert_eq!(k.last_wake(main), Some(WakeReason::Timeout));
}

#[test]
fn sleep_until_uses_absolute_time() {
    init_test_logging();
    let mut k = strict_priority_kernel();
    let main = k.main_thread();

    run_ticks(&mut k, 10);
    let deadline = k.now() + 25;
    assert!(k.sleep_until(deadline).is_blocked());
    run_ticks(&mut k, 25);
    assert_eq!(k.current(), main);
    assert_eq!(k.now(), deadline);

    // A deadline in the past completes immediately.
    assert!(!k.sleep_until(deadline).is_blocked());
}

// ============================================================================
// Yield and round-robin
// ============================================================================

#[test]
fn yield_rotates_equal_priority_threads() {
    init_test_logging();
    let mut k = strict_priority_kernel();
    let main = k.main_thread();
    let peer = spawn_ready(&mut k, "peer", 64);

    assert_eq!(k.current(), main);
    k.yield_now();
    assert_eq!(k.current(), peer);
    assert_eq!(k.thread_state(main), Some(ThreadState::Ready));
    k.yield_now();
    assert_eq!(k.current(), main);
}

#[test]
fn yield_is_a_noop_without_equal_or_higher_ready() {
    init_test_logging();
    let mut k = strict_priority_kernel();
    let main = k.main_thread();
    spawn_ready(&mut k, "lower", 10);
    k.yield_now();
    assert_eq!(k.current(), main);
}

#[test]
fn quantum_exhaustion_round_robins_equal_priorities() {
    init_test_logging();
    let mut k = tickos::Kernel::new(KernelConfig::default().with_quantum(Some(4)));
    let main = k.main_thread();
    let peer = spawn_ready(&mut k, "peer", 64);

    run_ticks(&mut k, 3);
    assert_eq!(k.current(), main);

    // Fourth tick exhausts main's slice; the peer takes over.
    k.tick_interrupt();
    assert_eq!(k.current(), peer);
    assert_eq!(k.thread_state(main), Some(ThreadState::Ready));

    // And four ticks later it comes back.
    run_ticks(&mut k, 4);
    assert_eq!(k.current(), main);
}

#[test]
fn no_round_robin_when_quantum_disabled() {
    init_test_logging();
    let mut k = strict_priority_kernel();
    let main = k.main_thread();
    spawn_ready(&mut k, "peer", 64);
    run_ticks(&mut k, 200);
    assert_eq!(k.current(), main);
}

#[test]
fn lower_priority_never_preempts_on_quantum_expiry() {
    init_test_logging();
    let mut k = tickos::Kernel::new(KernelConfig::default().with_quantum(Some(2)));
    let main = k.main_thread();
    spawn_ready(&mut k, "lower", 10);
    run_ticks(&mut k, 20);
    assert_eq!(k.current(), main);
}

// ============================================================================
// Spawn / pool limits
// ============================================================================

#[test]
fn spawn_fails_cleanly_when_pool_is_exhausted() {
    init_test_logging();
    let mut k = tickos::Kernel::new(KernelConfig::default().with_max_threads(3));
    // Main and idle occupy two slots.
    assert!(k.spawn(ThreadConfig::new("third")).is_ok());
    let err = k.spawn(ThreadConfig::new("fourth")).unwrap_err();
    assert_eq!(err, tickos::SpawnError::PoolExhausted { limit: 3 });
}

#[test]
fn spawned_thread_stays_suspended_until_resumed() {
    init_test_logging();
    let mut k = strict_priority_kernel();
    let t = k
        .spawn(
            ThreadConfig::new("t")
                .with_priority(Priority::new(200))
                .with_stack_size(2048),
        )
        .unwrap();
    assert_eq!(k.thread_state(t), Some(ThreadState::Suspended));
    assert_eq!(k.thread_name(t), Some("t"));
    assert_eq!(k.thread_stack_size(t), Some(2048));
    run_ticks(&mut k, 5);
    assert_eq!(k.thread_state(t), Some(ThreadState::Suspended));
    k.resume(t);
    assert_eq!(k.current(), t);
}

// ============================================================================
// Switch accounting
// ============================================================================

#[test]
fn context_switches_flow_through_the_port() {
    init_test_logging();
    let (mut k, log) = recording_kernel(KernelConfig::default().with_quantum(None));
    let main = k.main_thread();
    let idle = k.idle_thread();

    assert!(k.sleep(5).is_blocked());
    run_ticks(&mut k, 5);
    assert_eq!(log.switches(), vec![(main, idle), (idle, main)]);
    assert_eq!(k.stats().context_switches, 2);
}
