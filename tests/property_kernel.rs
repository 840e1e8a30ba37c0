//! Randomized invariants: timer delta sums, ready-list ordering, FIFO
//! stability, and exactly-one resolution of timed waits.

mod common;

use common::{init_test_logging, test_proptest_config};
use proptest::prelude::*;
use tickos::test_utils::{spawn_ready, strict_priority_kernel, test_kernel};
use tickos::{Message, QueueOrder, ThreadState, Timeout, WakeReason};

proptest! {
    #![proptest_config(test_proptest_config(128))]

    /// After any arm/disarm/tick sequence, the delta sum from the list head
    /// to an armed entry equals its true remaining deadline.
    #[test]
    fn timer_delta_sums_match_reference_model(
        ops in prop::collection::vec((1u64..50, any::<bool>(), any::<bool>()), 1..40)
    ) {
        init_test_logging();
        let mut k = test_kernel();
        let mut model: Vec<(tickos::TimerId, u64)> = Vec::new();
        let mut now = 0u64;

        for (delay, do_cancel, do_tick) in ops {
            let id = k.timer_arm(delay, |_| {}).unwrap();
            model.push((id, now + delay));

            if do_cancel && model.len() > 1 {
                let (victim, _) = model.remove(0);
                k.timer_disarm(victim).unwrap();
            }
            if do_tick {
                k.tick_interrupt();
                now += 1;
                model.retain(|&(_, deadline)| deadline > now);
            }

            for &(armed, deadline) in &model {
                prop_assert_eq!(k.timer_remaining(armed), Some(deadline - now));
            }
        }
        prop_assert_eq!(k.timers_pending(), model.len());
    }

    /// The ready list is always sorted by non-increasing priority, and
    /// equal-priority threads keep their arrival order.
    #[test]
    fn ready_list_stays_priority_sorted(prios in prop::collection::vec(1u8..60, 1..16)) {
        init_test_logging();
        let mut k = strict_priority_kernel();
        let mut arrivals: Vec<(tickos::ThreadId, u8)> = Vec::new();

        for priority in prios {
            let t = spawn_ready(&mut k, "w", priority);
            arrivals.push((t, priority));

            let order = k.ready_order();
            let mut last = u8::MAX;
            for &member in &order {
                let level = k.thread_priority(member).unwrap().level();
                prop_assert!(level <= last, "ready list out of order");
                last = level;
            }

            let position = |t: tickos::ThreadId| order.iter().position(|&m| m == t).unwrap();
            for (i, &(a, pa)) in arrivals.iter().enumerate() {
                for &(b, pb) in &arrivals[i + 1..] {
                    if pa == pb {
                        prop_assert!(
                            position(a) < position(b),
                            "equal-priority arrival order not preserved"
                        );
                    }
                }
            }
        }
    }

    /// A timed wait racing a signal resolves exactly once: the earlier
    /// event wins and the loser becomes a no-op.
    #[test]
    fn timed_wait_resolves_exactly_once(signal_at in 1u64..16, timeout in 1u64..16) {
        init_test_logging();
        let mut k = strict_priority_kernel();
        let main = k.main_thread();
        let sem = k.semaphore_create(0, QueueOrder::Fifo);
        spawn_ready(&mut k, "signaler", 30);

        prop_assert!(k.semaphore_wait(sem, Timeout::after(timeout)).is_blocked());
        for _ in 0..signal_at {
            k.tick_interrupt();
        }
        k.semaphore_signal(sem);
        for _ in 0..20 {
            k.tick_interrupt();
        }

        if timeout <= signal_at {
            // Timeout fired first; the late signal found no waiter.
            prop_assert_eq!(k.last_wake(main), Some(WakeReason::Timeout));
            prop_assert_eq!(k.semaphore_count(sem), Some(1));
        } else {
            prop_assert_eq!(k.last_wake(main), Some(WakeReason::Signal(Message::NONE)));
            prop_assert_eq!(k.semaphore_count(sem), Some(0));
        }
        prop_assert_eq!(k.timers_pending(), 0);
    }

    /// FIFO semaphores wake exactly the first k blockers, in order, however
    /// the signals are batched.
    #[test]
    fn fifo_semaphore_wakes_in_blocking_order(n in 2usize..6, batch in 1usize..6) {
        init_test_logging();
        let mut k = strict_priority_kernel();
        let sem = k.semaphore_create(0, QueueOrder::Fifo);
        let workers: Vec<_> = (0..n).map(|_| spawn_ready(&mut k, "w", 50)).collect();

        prop_assert!(k.sleep(10_000).is_blocked());
        for &w in &workers {
            prop_assert_eq!(k.current(), w);
            prop_assert!(k.semaphore_wait(sem, Timeout::Infinite).is_blocked());
        }
        prop_assert_eq!(k.current(), k.idle_thread());

        let batch = batch.min(n);
        k.isr_enter();
        for _ in 0..batch {
            k.semaphore_signal_from_isr(sem);
        }
        k.isr_exit();

        prop_assert_eq!(k.current(), workers[0]);
        for (i, &w) in workers.iter().enumerate() {
            if i < batch {
                prop_assert_eq!(k.last_wake(w), Some(WakeReason::Signal(Message::NONE)));
            } else {
                prop_assert_eq!(
                    k.thread_state(w),
                    Some(ThreadState::WaitingSemaphore { semaphore: sem })
                );
            }
        }
    }
}
