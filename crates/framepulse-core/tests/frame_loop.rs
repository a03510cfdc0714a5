use std::cell::{Cell, RefCell};
use std::rc::Rc;

use framepulse_core::{
    run_loop, FrameArgs, ManualClock, Priority, Registration, Scheduler, SchedulerConfig,
    ShutdownToken, SystemClock,
};

type Log = Rc<RefCell<Vec<&'static str>>>;

fn recorder(log: &Log, name: &'static str) -> impl FnMut(&FrameArgs<'_>) -> anyhow::Result<()> {
    let log = log.clone();
    move |_: &FrameArgs<'_>| {
        log.borrow_mut().push(name);
        Ok(())
    }
}

fn scheduler() -> (Scheduler<ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    (Scheduler::new(clock.clone()), clock)
}

#[test]
fn one_tick_runs_tiers_in_priority_then_registration_order() {
    let (mut s, _clock) = scheduler();
    let log: Log = Rc::default();

    s.register(recorder(&log, "idle"), Registration::new(Priority::Idle));
    s.register(recorder(&log, "critical-1"), Registration::new(Priority::Critical));
    s.register(recorder(&log, "low"), Registration::new(Priority::Low));
    s.register(recorder(&log, "high"), Registration::new(Priority::High));
    s.register(recorder(&log, "medium"), Registration::default());
    s.register(recorder(&log, "critical-2"), Registration::new(Priority::Critical));

    s.tick(16.0);

    assert_eq!(
        *log.borrow(),
        vec!["critical-1", "critical-2", "high", "medium", "low", "idle"]
    );
}

#[test]
fn running_state_follows_registry_occupancy() {
    let (mut s, clock) = scheduler();
    assert!(!s.is_running());

    let a = s.register(|_| Ok(()), Registration::default());
    assert!(s.is_running());
    assert!(clock.pending().is_some());

    let b = s.register(|_| Ok(()), Registration::new(Priority::Low));
    assert!(s.is_running());
    assert_eq!(clock.request_count(), 1);

    s.unregister(a);
    assert!(s.is_running());

    s.unregister(b);
    assert!(!s.is_running());
    assert!(clock.pending().is_none());
    assert_eq!(clock.cancel_count(), 1);

    s.unregister(b);
    assert!(!s.is_running());

    s.register(|_| Ok(()), Registration::default());
    assert!(s.is_running());
}

#[test]
fn fps_drives_tier_skipping() {
    let (mut degraded, _c1) = scheduler();
    degraded.register(|_| Ok(()), Registration::default());
    degraded.tick(40.0);
    assert_eq!(degraded.fps(), 25.0);
    assert!(!degraded.should_skip_priority(Priority::Critical));
    assert!(!degraded.should_skip_priority(Priority::High));
    assert!(degraded.should_skip_priority(Priority::Low));
    assert!(degraded.should_skip_priority(Priority::Idle));

    let (mut healthy, _c2) = scheduler();
    healthy.register(|_| Ok(()), Registration::default());
    healthy.tick(16.0);
    assert!(healthy.fps() >= 60.0);
    for tier in Priority::ALL {
        assert!(!healthy.should_skip_priority(tier), "{tier} skipped at full rate");
    }
}

#[test]
fn medium_tier_alternates_while_degraded() {
    let (mut s, _clock) = scheduler();
    let log: Log = Rc::default();
    s.register(recorder(&log, "c"), Registration::new(Priority::Critical));
    s.register(recorder(&log, "m"), Registration::new(Priority::Medium));
    s.register(recorder(&log, "l"), Registration::new(Priority::Low));

    for frame in 1..=4 {
        s.tick(frame as f64 * 40.0);
    }

    assert_eq!(*log.borrow(), vec!["c", "m", "c", "c", "m", "c"]);
    assert_eq!(s.stats().skipped_by_policy, 2 + 4);
}

#[test]
fn spent_budget_holds_back_lower_tiers_until_a_calm_frame() {
    let cfg = SchedulerConfig {
        slow_threshold_ms: 1_000.0,
        ..SchedulerConfig::default()
    };
    let clock = ManualClock::new();
    let mut s = Scheduler::with_config(clock.clone(), cfg);

    let burn = clock.clone();
    let high_runs = Rc::new(Cell::new(0u32));
    let high_seen = high_runs.clone();
    s.register(
        move |args: &FrameArgs<'_>| {
            high_seen.set(high_seen.get() + 1);
            if args.frame == 1 {
                burn.advance(20.0);
            }
            Ok(())
        },
        Registration::new(Priority::High),
    );

    let low_runs = Rc::new(Cell::new(0u32));
    let low_seen = low_runs.clone();
    s.register(
        move |_: &FrameArgs<'_>| {
            low_seen.set(low_seen.get() + 1);
            Ok(())
        },
        Registration::new(Priority::Low),
    );

    s.tick(16.0);
    assert_eq!(high_runs.get(), 1);
    assert_eq!(low_runs.get(), 0);
    assert_eq!(s.stats().skipped_by_budget, 1);

    s.tick(32.0);
    assert_eq!(high_runs.get(), 2);
    assert_eq!(low_runs.get(), 1);
}

#[test]
fn failing_callbacks_never_stop_the_frame() {
    let (mut s, _clock) = scheduler();
    let log: Log = Rc::default();

    let erroring = s.register(
        |_| Err(anyhow::anyhow!("audio device lost")),
        Registration::new(Priority::Critical).with_label("audio"),
    );
    let panicking = s.register(
        |_| panic!("gesture table corrupted"),
        Registration::new(Priority::High).with_label("gesture"),
    );
    s.register(recorder(&log, "ambient"), Registration::new(Priority::Idle));

    for frame in 1..=3 {
        s.tick(frame as f64 * 16.0);
    }

    assert_eq!(log.borrow().len(), 3);
    assert!(s.is_running());

    let audio = s.callback_stats(erroring).expect("audio registered");
    assert_eq!(audio.error_count, 3);
    assert_eq!(audio.run_count, 0);
    assert!(audio.enabled);
    assert!(audio.last_error.unwrap_or_default().contains("audio device lost"));

    let gesture = s.callback_stats(panicking).expect("gesture registered");
    assert_eq!(gesture.error_count, 3);
    assert!(gesture
        .last_error
        .unwrap_or_default()
        .contains("gesture table corrupted"));
}

#[test]
fn chronically_slow_callback_is_quarantined_until_reenabled() {
    let cfg = SchedulerConfig {
        slow_min_runs: 3,
        ..SchedulerConfig::default()
    };
    let clock = ManualClock::new();
    let mut s = Scheduler::with_config(clock.clone(), cfg);

    let slow = Rc::new(Cell::new(true));
    let runs = Rc::new(Cell::new(0u32));
    let (burn, is_slow, seen) = (clock.clone(), slow.clone(), runs.clone());
    let id = s.register(
        move |_: &FrameArgs<'_>| {
            seen.set(seen.get() + 1);
            if is_slow.get() {
                burn.advance(12.0);
            }
            Ok(())
        },
        Registration::new(Priority::Medium).with_label("bloom"),
    );

    for frame in 1..=5 {
        s.tick(frame as f64 * 16.0);
    }
    assert_eq!(runs.get(), 3);
    assert_eq!(s.is_enabled(id), Some(false));
    let stats = s.callback_stats(id).expect("still registered");
    assert!(stats.quarantined);
    assert_eq!(stats.run_count, 3);
    assert!(s.is_running());

    slow.set(false);
    s.set_enabled(id, true);
    s.tick(6.0 * 16.0);
    s.tick(7.0 * 16.0);
    assert_eq!(runs.get(), 5);
    assert_eq!(s.is_enabled(id), Some(true));
    let stats = s.callback_stats(id).expect("still registered");
    assert!(!stats.quarantined);
    assert_eq!(stats.run_count, 5);
    assert_eq!(stats.total_time_ms, 36.0);
}

#[test]
fn stats_count_registrations_not_enablement() {
    let (mut s, _clock) = scheduler();
    let a = s.register(|_| Ok(()), Registration::new(Priority::Critical));
    s.register(|_| Ok(()), Registration::new(Priority::Low));
    s.register(|_| Ok(()), Registration::new(Priority::Low));
    s.set_enabled(a, false);

    let stats = s.stats();
    assert_eq!(stats.callback_count, 3);
    assert_eq!(stats.enabled_count, 2);
    assert_eq!(stats.callbacks_by_priority.values().sum::<usize>(), 3);
    assert_eq!(stats.callbacks_by_priority[&Priority::Low], 2);
    assert_eq!(stats.callbacks_by_priority[&Priority::Idle], 0);
    assert_eq!(stats.callbacks_by_priority.len(), Priority::COUNT);

    assert_eq!(s.stats(), stats);
}

#[test]
fn three_tiers_at_full_rate_each_run_once_in_order() {
    let (mut s, _clock) = scheduler();
    let log: Log = Rc::default();
    s.register(recorder(&log, "high"), Registration::new(Priority::High));
    s.register(recorder(&log, "low"), Registration::new(Priority::Low));
    s.register(recorder(&log, "idle"), Registration::new(Priority::Idle));

    s.tick(16.0);

    assert_eq!(*log.borrow(), vec!["high", "low", "idle"]);
}

#[test]
fn target_fps_is_clamped() {
    let (mut s, _clock) = scheduler();
    s.set_target_fps(200.0);
    assert_eq!(s.target_fps(), 120.0);
    assert!((s.frame_budget_ms() - 1000.0 / 120.0).abs() < 1e-9);

    s.set_target_fps(5.0);
    assert_eq!(s.target_fps(), 15.0);
    assert!((s.target_frame_time_ms() - 1000.0 / 15.0).abs() < 1e-9);

    s.set_target_fps(f64::NAN);
    assert_eq!(s.target_fps(), 15.0);
}

#[test]
fn unregistering_unknown_ids_is_a_no_op() {
    let (mut s, _clock) = scheduler();
    let (mut other, _other_clock) = scheduler();
    other.register(|_| Ok(()), Registration::default());
    let foreign = other.register(|_| Ok(()), Registration::default());

    let mine = s.register(|_| Ok(()), Registration::default());
    let before = s.stats();

    s.unregister(foreign);
    assert_eq!(s.stats(), before);
    assert!(s.is_registered(mine));

    s.unregister(mine);
    s.unregister(mine);
    assert_eq!(s.stats().callback_count, 0);
}

#[test]
fn context_is_passed_through_untouched() {
    let (mut s, _clock) = scheduler();
    let palette = Rc::new(vec![0xff3366u32, 0x33ccff]);
    let seen = Rc::new(Cell::new(0usize));
    let seen_in = seen.clone();

    s.register(
        move |args: &FrameArgs<'_>| {
            let colors = args
                .context::<Vec<u32>>()
                .ok_or_else(|| anyhow::anyhow!("missing palette"))?;
            seen_in.set(colors.len());
            Ok(())
        },
        Registration::new(Priority::High).with_context(palette.clone()),
    );

    s.tick(16.0);
    assert_eq!(seen.get(), 2);
    assert_eq!(*palette, vec![0xff3366, 0x33ccff]);
}

#[test]
fn delta_time_follows_delivered_timestamps() {
    let clock = ManualClock::starting_at(100.0);
    let mut s = Scheduler::new(clock.clone());
    let deltas = Rc::new(RefCell::new(Vec::new()));
    let sink = deltas.clone();
    s.register(
        move |args: &FrameArgs<'_>| {
            sink.borrow_mut().push((args.delta_ms, args.timestamp_ms, args.frame));
            Ok(())
        },
        Registration::new(Priority::Critical),
    );

    s.tick(116.0);
    s.tick(150.0);

    assert_eq!(*deltas.borrow(), vec![(16.0, 116.0, 1), (34.0, 150.0, 2)]);
    assert_eq!(s.delta_time_ms(), 34.0);
    assert_eq!(s.last_frame_time_ms(), 150.0);
    assert_eq!(s.stats().average_frame_time, 25.0);
}

#[test]
fn stats_serialize_with_lowercase_tier_keys() {
    let (mut s, _clock) = scheduler();
    let id = s.register(|_| Ok(()), Registration::new(Priority::High).with_label("orb"));
    s.tick(16.0);

    let stats = serde_json::to_value(s.stats()).expect("stats serialize");
    assert_eq!(stats["callbacks_by_priority"]["high"], 1);
    assert_eq!(stats["callbacks_by_priority"]["idle"], 0);
    assert_eq!(stats["frame_count"], 1);
    assert_eq!(stats["is_running"], true);

    let cb = serde_json::to_value(s.callback_stats(id).expect("registered")).expect("serialize");
    assert_eq!(cb["label"], "orb");
    assert_eq!(cb["priority"], "high");
    assert_eq!(cb["run_count"], 1);
}

#[test]
fn run_loop_starts_from_a_queued_registration() {
    let mut s = Scheduler::new(SystemClock::new());
    let runs = Rc::new(Cell::new(0u32));
    let seen = runs.clone();
    s.handle().register(
        move |_: &FrameArgs<'_>| {
            seen.set(seen.get() + 1);
            Ok(())
        },
        Registration::new(Priority::Critical),
    );

    let ticks = run_loop(&mut s, &ShutdownToken::new(), Some(3));
    assert_eq!(ticks, 3);
    assert_eq!(runs.get(), 3);
    assert!(s.is_running());
}

#[test]
fn run_loop_ends_when_the_last_callback_leaves() {
    let mut s = Scheduler::new(SystemClock::new());
    let handle = s.handle();
    s.register(
        move |args: &FrameArgs<'_>| {
            if args.frame == 2 {
                handle.unregister(args.id);
            }
            Ok(())
        },
        Registration::new(Priority::Critical),
    );

    let ticks = run_loop(&mut s, &ShutdownToken::new(), Some(100));
    assert_eq!(ticks, 2);
    assert!(!s.is_running());
}

#[test]
fn run_loop_honours_a_requested_shutdown() {
    let mut s = Scheduler::new(SystemClock::new());
    s.register(|_| Ok(()), Registration::default());
    let shutdown = ShutdownToken::new();
    shutdown.request();

    assert_eq!(run_loop(&mut s, &shutdown, None), 0);
    assert!(s.is_running());
}
