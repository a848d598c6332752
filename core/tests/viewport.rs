//! Viewport fitter tests: determinism, scale clamping, refit triggers.

use std::time::{Duration, Instant};
use swarmview_core::{
    config::PlaybackConfig,
    controller::PlaybackController,
    ingress::IngressEvent,
    render::RecordingSink,
    snapshot::{EntityPhase, EntityState, Snapshot},
    types::Point,
    viewport::{self, SurfaceSize},
};

fn snap_with(positions: &[(f64, f64)]) -> Snapshot {
    let mut snapshot = Snapshot::new(0.0);
    for (i, &(x, y)) in positions.iter().enumerate() {
        snapshot.entities.insert(
            i as u32,
            EntityState::new(Point::new(x, y), EntityPhase::Idle),
        );
    }
    snapshot
}

/// Fitting is a pure function of snapshot, surface, and config: two fits
/// of the same input are identical, and the known input frames exactly.
#[test]
fn fit_is_deterministic() {
    let snapshot = snap_with(&[(-5.0, -5.0), (5.0, 5.0)]);
    let surface = SurfaceSize::default();
    let config = PlaybackConfig::default();

    let a = viewport::fit(&snapshot, surface, &config);
    let b = viewport::fit(&snapshot, surface, &config);
    assert_eq!(a, b, "same input must produce the same mapping");

    // A 10x10 world on an 800x600 surface fits at well over 1:1, so the
    // scale clamps to max_scale; the center is the bbox midpoint.
    assert_eq!(a.scale, config.max_scale);
    assert_eq!((a.center_x, a.center_y), (0.0, 0.0));
    assert!(a.needs_full_invalidate, "a fresh fit demands a full repaint");
}

/// A degenerate scene (every entity coincident) would fit at infinite
/// scale; the clamp lands it on `max_scale` instead.
#[test]
fn coincident_entities_clamp_to_max_scale() {
    let snapshot = snap_with(&[(3.0, 4.0), (3.0, 4.0), (3.0, 4.0)]);
    let config = PlaybackConfig::default();

    let state = viewport::fit(&snapshot, SurfaceSize::default(), &config);
    assert_eq!(state.scale, config.max_scale);
    assert_eq!((state.center_x, state.center_y), (3.0, 4.0));
}

/// A pathologically spread scene clamps to `min_scale` rather than
/// shrinking entities into invisibility.
#[test]
fn far_spread_clamps_to_min_scale() {
    let snapshot = snap_with(&[(-100_000.0, 0.0), (100_000.0, 0.0)]);
    let config = PlaybackConfig::default();

    let state = viewport::fit(&snapshot, SurfaceSize::default(), &config);
    assert_eq!(state.scale, config.min_scale);
}

/// Between the clamps the fit is exact: a 100-wide world into 40 usable
/// pixels is scale 0.4.
#[test]
fn unclamped_fit_uses_the_tighter_axis() {
    let snapshot = snap_with(&[(-50.0, -50.0), (50.0, 50.0)]);
    let config = PlaybackConfig::default();

    let state = viewport::fit(&snapshot, SurfaceSize::new(120.0, 120.0), &config);
    assert!(
        (state.scale - 0.4).abs() < 1e-12,
        "expected exact 0.4, got {}",
        state.scale
    );
}

/// The fit is one-shot per run: later snapshots, however spread out,
/// never move the camera.
#[test]
fn fit_happens_once_per_run() {
    let mut controller = PlaybackController::synchronous(PlaybackConfig::default());
    controller.start("fit-test");
    let handle = controller.ingress_handle();
    handle.deliver(IngressEvent::single("fit-test", snap_with(&[(-5.0, -5.0), (5.0, 5.0)])));
    handle.deliver(IngressEvent::single(
        "fit-test",
        snap_with(&[(-500.0, -500.0), (500.0, 500.0)]),
    ));

    let mut sink = RecordingSink::new();
    let origin = Instant::now();
    controller.tick(origin, &mut sink);
    let fitted = controller.viewport().expect("fit after the first frame");
    controller.tick(origin + Duration::from_millis(17), &mut sink);
    let after = controller.viewport().expect("still fitted");

    assert_eq!(fitted.scale, after.scale, "camera must not move mid-run");
    assert_eq!(fitted.center_x, after.center_x);
    assert_eq!(fitted.center_y, after.center_y);
}

/// Resizing the surface invalidates the mapping and forces a full
/// repaint with a refitted scale on the next frame.
#[test]
fn surface_resize_refits_and_fully_repaints() {
    let mut controller = PlaybackController::synchronous(PlaybackConfig::default());
    controller.set_surface(SurfaceSize::new(120.0, 120.0));
    controller.start("resize-test");
    let handle = controller.ingress_handle();
    for i in 0..3 {
        handle.deliver(IngressEvent::single(
            "resize-test",
            {
                let mut s = snap_with(&[(-50.0, -50.0), (50.0, 50.0)]);
                s.time = i as f64;
                s
            },
        ));
    }

    let mut sink = RecordingSink::new();
    let origin = Instant::now();
    controller.tick(origin, &mut sink);
    let before = controller.viewport().expect("fitted");
    assert!((before.scale - 0.4).abs() < 1e-12);

    controller.set_surface(SurfaceSize::new(220.0, 220.0));
    assert!(controller.viewport().is_none(), "resize drops the stale fit");

    controller.tick(origin + Duration::from_millis(17), &mut sink);
    let after = controller.viewport().expect("refitted");
    assert!(
        (after.scale - 1.0).abs() < 1e-12,
        "140 usable pixels over a 100-wide world clamps at max_scale, got {}",
        after.scale
    );
    let frame = sink.last().expect("post-resize frame");
    assert!(frame.scope.is_full(), "a refit repaints the whole surface");
}

/// Toggling the ring overlay changes what must fit on screen, so the
/// config update schedules a refit.
#[test]
fn ring_toggle_invalidates_the_fit() {
    let mut controller = PlaybackController::synchronous(PlaybackConfig::default());
    controller.start("ring-test");
    let handle = controller.ingress_handle();
    handle.deliver(IngressEvent::single("ring-test", snap_with(&[(-5.0, -5.0), (5.0, 5.0)])));

    let mut sink = RecordingSink::new();
    controller.tick(Instant::now(), &mut sink);
    assert!(controller.viewport().is_some());

    let ringed = PlaybackConfig {
        ring_enabled: true,
        ..controller.config().clone()
    };
    controller.update_config(ringed);
    assert!(
        controller.viewport().is_none(),
        "a framing-relevant config change must drop the fit"
    );
}
