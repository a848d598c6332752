//! Render scheduler playback tests: cadence gate, catch-up policy,
//! repaint throttle, exhaustion, pause/resume.
//!
//! Every test drives `tick` with fabricated `Instant` offsets, so the
//! whole suite runs without a real display clock.

use std::time::{Duration, Instant};
use swarmview_core::{
    config::PlaybackConfig,
    controller::PlaybackController,
    ingress::IngressEvent,
    render::RecordingSink,
    scheduler::TickOutcome,
    snapshot::{EntityPhase, EntityState, Snapshot},
    types::Point,
};

const RUN: &str = "playback-test";

fn snap(time: f64, positions: &[(u32, f64, f64)]) -> Snapshot {
    let mut snapshot = Snapshot::new(time);
    for &(id, x, y) in positions {
        snapshot
            .entities
            .insert(id, EntityState::new(Point::new(x, y), EntityPhase::Moving));
    }
    snapshot
}

/// Controller with inline analytics and `count` single-entity snapshots
/// already delivered through the transport handle.
fn controller_with_stream(count: usize) -> PlaybackController {
    let mut controller = PlaybackController::synchronous(PlaybackConfig::default());
    controller.start(RUN);
    let handle = controller.ingress_handle();
    for i in 0..count {
        let report = handle.deliver(IngressEvent::single(
            RUN,
            snap(i as f64 * 0.1, &[(1, i as f64 * 10.0, 0.0)]),
        ));
        assert_eq!(report.accepted, 1, "snapshot {i} should be admitted");
    }
    controller
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Playback never permutes snapshots: the sequence of displayed times is
/// a strictly increasing subsequence of the enqueued times, and the run
/// finishes on the last snapshot. The stream is a seeded random walk so
/// the property holds for arbitrary movement, not a crafted path.
#[test]
fn displayed_times_are_an_ordered_subsequence() {
    use rand::{Rng, SeedableRng};
    let mut rng = rand_pcg::Pcg64Mcg::seed_from_u64(0xA11CE);

    let mut controller = PlaybackController::synchronous(PlaybackConfig::default());
    controller.start(RUN);
    let handle = controller.ingress_handle();
    let (mut x, mut y) = (0.0f64, 0.0f64);
    for i in 0..12 {
        x += rng.gen_range(-4.0..4.0);
        y += rng.gen_range(-4.0..4.0);
        let report = handle.deliver(IngressEvent::single(RUN, snap(i as f64 * 0.1, &[(1, x, y)])));
        assert_eq!(report.accepted, 1, "snapshot {i} should be admitted");
    }
    let mut sink = RecordingSink::new();
    let origin = Instant::now();

    let mut displayed = Vec::new();
    for i in 0..200u32 {
        match controller.tick(origin + ms(17) * i, &mut sink) {
            TickOutcome::Rendered { displayed_time, .. } => displayed.push(displayed_time),
            TickOutcome::Exhausted => break,
            outcome => panic!("unexpected outcome {outcome:?} at tick {i}"),
        }
    }

    assert!(!displayed.is_empty(), "expected at least one rendered frame");
    for pair in displayed.windows(2) {
        assert!(
            pair[0] < pair[1],
            "displayed times went backwards: {} then {}",
            pair[0],
            pair[1]
        );
    }
    let last = displayed.last().copied().unwrap();
    assert!(
        (last - 1.1).abs() < 1e-9,
        "run must end on the final snapshot's time, got {last}"
    );
}

/// With the default thresholds (backlog 5, max catch-up 3) a queue of 10
/// yields exactly min(3, 10/2) = 3 consumed snapshots in one tick, and
/// the repaint shows the third one's time.
#[test]
fn catch_up_consumes_three_and_displays_the_last() {
    let mut controller = controller_with_stream(10);
    let mut sink = RecordingSink::new();

    let outcome = controller.tick(Instant::now(), &mut sink);
    match outcome {
        TickOutcome::Rendered {
            consumed,
            displayed_time,
            repainted,
        } => {
            assert_eq!(consumed, 3, "backlog of 10 should consume 3 in one tick");
            assert!(
                (displayed_time - 0.2).abs() < 1e-9,
                "displayed time must be the third snapshot's, got {displayed_time}"
            );
            assert!(repainted, "the catch-up tick must repaint");
        }
        other => panic!("expected a rendered tick, got {other:?}"),
    }
    assert_eq!(controller.queue_len(), 7, "7 snapshots should remain queued");
    assert_eq!(
        sink.repaint_count(),
        1,
        "catch-up repaints once, after the last of the batch"
    );
}

/// A tick arriving before `frame_period` has elapsed is a no-op for
/// playback: nothing dequeued, nothing painted.
#[test]
fn advance_gate_holds_early_ticks() {
    let mut controller = controller_with_stream(3);
    let mut sink = RecordingSink::new();
    let origin = Instant::now();

    assert!(matches!(
        controller.tick(origin, &mut sink),
        TickOutcome::Rendered { .. }
    ));
    let queued = controller.queue_len();

    let outcome = controller.tick(origin + ms(5), &mut sink);
    assert_eq!(outcome, TickOutcome::TooEarly, "5 ms < frame_period");
    assert_eq!(controller.queue_len(), queued, "early tick must not dequeue");
    assert_eq!(sink.repaint_count(), 1, "early tick must not repaint");
}

/// A throttled tick still applies its snapshot; the dirty regions carry
/// over so the next repaint covers the skipped movement too.
#[test]
fn repaint_throttle_accumulates_dirty_regions() {
    let config = PlaybackConfig {
        frame_period_ms: 10,
        min_render_interval_ms: 30,
        ..PlaybackConfig::default()
    };
    let mut controller = PlaybackController::synchronous(config);
    controller.start(RUN);
    let handle = controller.ingress_handle();
    for (i, x) in [0.0, 10.0, 20.0].into_iter().enumerate() {
        handle.deliver(IngressEvent::single(RUN, snap(i as f64, &[(1, x, 0.0)])));
    }

    let mut sink = RecordingSink::new();
    let origin = Instant::now();

    // First tick paints (fresh fit forces a full repaint).
    assert!(matches!(
        controller.tick(origin, &mut sink),
        TickOutcome::Rendered { repainted: true, .. }
    ));
    // Second tick advances but lands inside the repaint window.
    assert!(matches!(
        controller.tick(origin + ms(10), &mut sink),
        TickOutcome::Rendered { repainted: false, .. }
    ));
    // Third tick paints both pending moves.
    assert!(matches!(
        controller.tick(origin + ms(30), &mut sink),
        TickOutcome::Rendered { repainted: true, .. }
    ));

    let last = sink.last().expect("a painted frame");
    let centers: Vec<(f64, f64)> = match &last.scope {
        swarmview_core::dirty::RepaintScope::Regions(regions) => {
            regions.iter().map(|r| (r.center.x, r.center.y)).collect()
        }
        scope => panic!("expected per-region scope, got {scope:?}"),
    };
    for expected in [(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)] {
        assert!(
            centers.contains(&expected),
            "accumulated regions {centers:?} must cover {expected:?}"
        );
    }
}

/// An empty queue after at least one played frame ends the run: one
/// terminal full-surface frame, session `Ended`, then idle ticks.
#[test]
fn exhaustion_emits_terminal_frame_and_ends_the_session() {
    let mut controller = controller_with_stream(2);
    let mut sink = RecordingSink::new();
    let origin = Instant::now();

    let mut exhausted_at = None;
    for i in 0..10u32 {
        if controller.tick(origin + ms(17) * i, &mut sink) == TickOutcome::Exhausted {
            exhausted_at = Some(i);
            break;
        }
    }
    assert!(exhausted_at.is_some(), "stream of 2 must exhaust");

    let last = sink.last().expect("terminal frame");
    assert!(last.terminal, "final frame must carry the terminal flag");
    assert!(last.scope.is_full(), "terminal frame repaints everything");
    assert_eq!(
        controller.status(),
        swarmview_core::session::RunStatus::Ended
    );

    let after = controller.tick(origin + ms(17) * 20, &mut sink);
    assert_eq!(after, TickOutcome::Idle, "ended sessions do not tick");
}

/// A surface resize after the last buffered snapshot has played must not
/// wedge the run: the exhaustion tick refits from the retained world and
/// still emits the terminal frame.
#[test]
fn exhaustion_survives_a_resize_after_the_last_snapshot() {
    use swarmview_core::viewport::SurfaceSize;

    let mut controller = controller_with_stream(1);
    let mut sink = RecordingSink::new();
    let origin = Instant::now();

    assert!(matches!(
        controller.tick(origin, &mut sink),
        TickOutcome::Rendered { .. }
    ));
    controller.set_surface(SurfaceSize::new(1024.0, 768.0));
    assert!(controller.viewport().is_none(), "resize drops the stale fit");

    let mut exhausted = false;
    for i in 1..=50u32 {
        if controller.tick(origin + ms(17) * i, &mut sink) == TickOutcome::Exhausted {
            exhausted = true;
            break;
        }
    }
    assert!(exhausted, "run must still end after a late resize");
    assert_eq!(
        controller.status(),
        swarmview_core::session::RunStatus::Ended
    );
    let last = sink.last().expect("terminal frame");
    assert!(last.terminal, "the terminal frame must still be emitted");
    assert!(
        controller.viewport().is_some(),
        "the terminal frame carries a refitted mapping"
    );
}

/// Before the first frame of a run, an empty queue is the transport
/// being slow, not the end of the stream.
#[test]
fn empty_queue_before_first_frame_is_waiting_not_exhaustion() {
    let mut controller = PlaybackController::synchronous(PlaybackConfig::default());
    controller.start(RUN);
    let mut sink = RecordingSink::new();

    let outcome = controller.tick(Instant::now(), &mut sink);
    assert_eq!(outcome, TickOutcome::Waiting);
    assert_eq!(controller.frames_played(), 0);
    assert!(controller.is_active(), "waiting must not end the session");
}

/// Pausing freezes consumption entirely; resuming picks up with the very
/// next queued snapshot, skipping nothing.
#[test]
fn pause_freezes_and_resume_continues_without_skips() {
    let mut controller = controller_with_stream(5);
    let mut sink = RecordingSink::new();
    let origin = Instant::now();

    match controller.tick(origin, &mut sink) {
        TickOutcome::Rendered { displayed_time, .. } => {
            assert!((displayed_time - 0.0).abs() < 1e-9)
        }
        other => panic!("expected a rendered tick, got {other:?}"),
    }

    controller.pause();
    for i in 1..=3u32 {
        assert_eq!(
            controller.tick(origin + ms(17) * i, &mut sink),
            TickOutcome::Paused
        );
    }
    assert_eq!(controller.queue_len(), 4, "paused ticks must not dequeue");

    controller.resume();
    match controller.tick(origin + ms(17) * 4, &mut sink) {
        TickOutcome::Rendered { displayed_time, .. } => assert!(
            (displayed_time - 0.1).abs() < 1e-9,
            "resume must play the next snapshot in order, got t={displayed_time}"
        ),
        other => panic!("expected a rendered tick after resume, got {other:?}"),
    }
}
