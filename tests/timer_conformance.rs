//! Virtual-timer conformance: delta-list behavior, expiry order, disarm
//! semantics, and callbacks re-entering kernel APIs.

mod common;

use common::init_test_logging;
use std::sync::{Arc, Mutex};
use tickos::test_utils::{run_ticks, spawn_ready, strict_priority_kernel, test_kernel};
use tickos::{ThreadState, TimerError, WakeReason};

type FireLog = Arc<Mutex<Vec<&'static str>>>;

fn fire_log() -> FireLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(log: &FireLog, tag: &'static str) -> impl FnOnce(&mut tickos::Kernel) + Send + 'static {
    let log = log.clone();
    move |_| log.lock().unwrap().push(tag)
}

// ============================================================================
// Arming and expiry
// ============================================================================

#[test]
fn timer_fires_after_exact_delay() {
    init_test_logging();
    let mut k = test_kernel();
    let log = fire_log();
    k.timer_arm(3, record(&log, "t")).unwrap();

    run_ticks(&mut k, 2);
    assert!(log.lock().unwrap().is_empty());
    k.tick_interrupt();
    assert_eq!(*log.lock().unwrap(), vec!["t"]);
    assert_eq!(k.timers_pending(), 0);
}

#[test]
fn zero_tick_deadline_is_rejected() {
    init_test_logging();
    let mut k = test_kernel();
    let err = k.timer_arm(0, |_| {}).unwrap_err();
    assert_eq!(err, TimerError::ImmediateDeadline);
    assert_eq!(k.timers_pending(), 0);
}

#[test]
fn timers_fire_in_deadline_order() {
    init_test_logging();
    let mut k = test_kernel();
    let log = fire_log();
    k.timer_arm(30, record(&log, "late")).unwrap();
    k.timer_arm(10, record(&log, "early")).unwrap();
    k.timer_arm(20, record(&log, "middle")).unwrap();

    run_ticks(&mut k, 30);
    assert_eq!(*log.lock().unwrap(), vec!["early", "middle", "late"]);
}

#[test]
fn equal_deadlines_fire_in_arming_order() {
    init_test_logging();
    let mut k = test_kernel();
    let log = fire_log();
    k.timer_arm(50, record(&log, "first")).unwrap();
    k.timer_arm(50, record(&log, "second")).unwrap();

    run_ticks(&mut k, 49);
    assert!(log.lock().unwrap().is_empty());
    k.tick_interrupt();
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
}

// ============================================================================
// Remaining time and disarm
// ============================================================================

#[test]
fn remaining_reports_absolute_deadlines() {
    init_test_logging();
    let mut k = test_kernel();
    let a = k.timer_arm(10, |_| {}).unwrap();
    let b = k.timer_arm(25, |_| {}).unwrap();
    let c = k.timer_arm(15, |_| {}).unwrap();

    assert_eq!(k.timer_remaining(a), Some(10));
    assert_eq!(k.timer_remaining(c), Some(15));
    assert_eq!(k.timer_remaining(b), Some(25));

    run_ticks(&mut k, 7);
    assert_eq!(k.timer_remaining(a), Some(3));
    assert_eq!(k.timer_remaining(c), Some(8));
    assert_eq!(k.timer_remaining(b), Some(18));
}

#[test]
fn disarm_preserves_later_deadlines() {
    init_test_logging();
    let mut k = test_kernel();
    let log = fire_log();
    let _a = k.timer_arm(10, record(&log, "a")).unwrap();
    let b = k.timer_arm(25, record(&log, "b")).unwrap();
    let c = k.timer_arm(40, record(&log, "c")).unwrap();

    k.timer_disarm(b).unwrap();
    assert_eq!(k.timer_remaining(c), Some(40));

    run_ticks(&mut k, 40);
    assert_eq!(*log.lock().unwrap(), vec!["a", "c"]);
}

#[test]
fn disarm_head_preserves_successor() {
    init_test_logging();
    let mut k = test_kernel();
    let log = fire_log();
    let a = k.timer_arm(10, record(&log, "a")).unwrap();
    let _b = k.timer_arm(30, record(&log, "b")).unwrap();

    k.timer_disarm(a).unwrap();
    run_ticks(&mut k, 30);
    assert_eq!(*log.lock().unwrap(), vec!["b"]);
}

#[test]
fn fired_timer_handle_goes_stale() {
    init_test_logging();
    let mut k = test_kernel();
    let a = k.timer_arm(2, |_| {}).unwrap();
    run_ticks(&mut k, 2);
    assert_eq!(k.timer_remaining(a), None);
}

// ============================================================================
// Callbacks re-entering the kernel
// ============================================================================

#[test]
fn callback_may_rearm_from_isr_context() {
    init_test_logging();
    let mut k = test_kernel();
    let log = fire_log();
    let inner = record(&log, "second");
    let outer = {
        let log = log.clone();
        move |k: &mut tickos::Kernel| {
            log.lock().unwrap().push("first");
            k.timer_arm_from_isr(5, inner).unwrap();
        }
    };
    k.timer_arm(5, outer).unwrap();

    run_ticks(&mut k, 5);
    assert_eq!(*log.lock().unwrap(), vec!["first"]);
    run_ticks(&mut k, 5);
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
}

#[test]
fn callback_may_signal_a_semaphore() {
    init_test_logging();
    let mut k = strict_priority_kernel();
    let main = k.main_thread();
    let sem = k.semaphore_create(0, tickos::QueueOrder::Fifo);

    k.timer_arm(4, move |k| k.semaphore_signal_from_isr(sem))
        .unwrap();
    assert!(k
        .semaphore_wait(sem, tickos::Timeout::Infinite)
        .is_blocked());
    assert_eq!(k.current(), k.idle_thread());

    run_ticks(&mut k, 4);
    assert_eq!(k.current(), main);
    assert_eq!(
        k.last_wake(main),
        Some(WakeReason::Signal(tickos::Message::NONE))
    );
}

#[test]
fn callback_may_resume_a_suspended_thread() {
    init_test_logging();
    let mut k = strict_priority_kernel();
    let t = k
        .spawn(tickos::ThreadConfig::new("late").with_priority(tickos::types::Priority::new(90)))
        .unwrap();
    k.timer_arm(3, move |k| k.resume_from_isr(t)).unwrap();

    run_ticks(&mut k, 2);
    assert_eq!(k.thread_state(t), Some(ThreadState::Suspended));
    k.tick_interrupt();
    // Resumed from the callback and, outranking main, switched in at ISR exit.
    assert_eq!(k.current(), t);
}

#[test]
fn two_sleepers_expiring_together_wake_in_arming_order() {
    init_test_logging();
    let mut k = strict_priority_kernel();
    let a = spawn_ready(&mut k, "a", 50);
    let b = spawn_ready(&mut k, "b", 50);

    assert!(k.sleep(100).is_blocked());
    assert_eq!(k.current(), a);
    assert!(k.sleep(10).is_blocked());
    assert_eq!(k.current(), b);
    assert!(k.sleep(10).is_blocked());
    assert_eq!(k.current(), k.idle_thread());

    run_ticks(&mut k, 10);
    // Both woke on the same tick; a armed first, so it readied first.
    assert_eq!(k.current(), a);
    assert_eq!(k.ready_order().first(), Some(&b));
}
