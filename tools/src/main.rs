//! playback-runner: headless playback harness for swarmview.
//!
//! Synthesizes a deterministic snapshot stream, feeds it through the
//! controller the way a transport would, and drives ticks with a
//! stepped clock so a whole run plays out in milliseconds.
//!
//! Usage:
//!   playback-runner --seed 42 --entities 12 --snapshots 240 --batch 8
//!   playback-runner --seed 7 --no-worker --ring

use anyhow::Result;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::env;
use std::thread;
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

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let entities = parse_arg(&args, "--entities", 12u32).max(1);
    let snapshots = parse_arg(&args, "--snapshots", 240usize).max(2);
    let batch = parse_arg(&args, "--batch", 8usize).max(1);
    let no_worker = args.iter().any(|a| a == "--no-worker");
    let ring = args.iter().any(|a| a == "--ring");
    for flag in args.iter().skip(1).filter(|a| a.starts_with("--")) {
        if !matches!(
            flag.as_str(),
            "--seed" | "--entities" | "--snapshots" | "--batch" | "--no-worker" | "--ring"
        ) {
            log::warn!("Unknown flag: {flag}");
        }
    }

    println!("swarmview — playback-runner");
    println!("  seed:      {seed}");
    println!("  entities:  {entities}");
    println!("  snapshots: {snapshots}");
    println!("  batch:     {batch}");
    println!("  worker:    {}", !no_worker);
    println!("  ring:      {ring}");
    println!();

    let stream = synthesize_stream(seed, entities, snapshots);

    let config = PlaybackConfig {
        ring_enabled: ring,
        ..PlaybackConfig::default()
    };
    let mut controller = if no_worker {
        PlaybackController::synchronous(config)
    } else {
        PlaybackController::new(config)
    };

    let run_id = format!("run-{}", uuid::Uuid::new_v4());
    controller.start(run_id.clone());

    // The first slice arrives one by one as raw JSON through the
    // transport handle, the way a websocket would deliver it; the rest
    // in typed bursts through the controller, mid-playback.
    let handle = controller.ingress_handle();
    let mut accepted = 0usize;
    let mut dropped = 0usize;
    let mut fed = 0usize;
    for snapshot in stream.iter().take(batch) {
        let payload =
            serde_json::to_string(&IngressEvent::single(run_id.clone(), snapshot.clone()))?;
        let report = handle.deliver_json(&payload)?;
        accepted += report.accepted;
        dropped += report.dropped;
        fed += 1;
    }

    let mut sink = RecordingSink::new();
    let origin = Instant::now();
    let period = Duration::from_millis(17);
    let max_ticks = snapshots as u64 * 6 + 400;
    let mut ticks = 0u64;
    let mut terminal_seen = false;
    let mut paused_once = false;
    let mut next_burst_at = 2u64;

    while ticks < max_ticks {
        let now = origin + period * ticks as u32;

        if fed < stream.len() && ticks >= next_burst_at {
            let end = (fed + batch).min(stream.len());
            let report =
                controller.ingest(IngressEvent::batch(run_id.clone(), stream[fed..end].to_vec()))?;
            accepted += report.accepted;
            dropped += report.dropped;
            fed = end;
            next_burst_at = ticks + 3;
        }

        // Pause briefly at the midpoint: the playback clock must
        // freeze and resume with the very next queued snapshot.
        if !paused_once && controller.frames_played() >= snapshots as u64 / 2 {
            paused_once = true;
            controller.pause();
            for offset in 1..=3u32 {
                controller.tick(now + period * offset, &mut sink);
            }
            ticks += 3;
            controller.resume();
            continue;
        }

        match controller.tick(now, &mut sink) {
            TickOutcome::Exhausted => {
                terminal_seen = true;
                break;
            }
            TickOutcome::Idle => break,
            TickOutcome::Waiting if !no_worker => {
                // Give the worker a moment to hand a batch back.
                thread::sleep(Duration::from_millis(1));
            }
            _ => {}
        }
        ticks += 1;
    }

    print_summary(
        &controller,
        &sink,
        &run_id,
        stream.len(),
        accepted,
        dropped,
        ticks,
        terminal_seen,
    );
    Ok(())
}

/// Random-walk world: entities scatter across a disc, wander step by
/// step, one freezes mid-run, and a tail of them terminates near the
/// end so the final frames exercise the terminal styling.
fn synthesize_stream(seed: u64, entities: u32, snapshots: usize) -> Vec<Snapshot> {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let mut positions: Vec<Point> = (0..entities)
        .map(|_| Point::new(rng.gen_range(-120.0..120.0), rng.gen_range(-120.0..120.0)))
        .collect();
    let mut terminated = vec![false; entities as usize];

    let freeze_window = snapshots / 3..snapshots / 2;
    let terminate_from = snapshots * 3 / 4;

    let mut out = Vec::with_capacity(snapshots);
    for step in 0..snapshots {
        let mut snapshot = Snapshot::new(step as f64 * 0.1);
        for id in 0..entities {
            let idx = id as usize;
            let frozen = id == 0 && freeze_window.contains(&step);
            if !terminated[idx] {
                if step >= terminate_from && rng.gen_bool(0.02) {
                    terminated[idx] = true;
                } else if !frozen && step > 0 {
                    positions[idx].x += rng.gen_range(-4.0..4.0);
                    positions[idx].y += rng.gen_range(-4.0..4.0);
                }
            }

            let phase = if terminated[idx] {
                EntityPhase::Terminated
            } else if frozen {
                EntityPhase::Frozen
            } else if step == 0 {
                EntityPhase::Idle
            } else {
                EntityPhase::Moving
            };
            let mut entity = EntityState::new(positions[idx], phase);
            if frozen {
                entity.marker = Some("held".into());
            }
            snapshot.entities.insert(id, entity);
        }
        out.push(snapshot);
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn print_summary(
    controller: &PlaybackController,
    sink: &RecordingSink,
    run_id: &str,
    synthesized: usize,
    accepted: usize,
    dropped: usize,
    ticks: u64,
    terminal_seen: bool,
) {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:          {run_id}");
    println!("  status:          {:?}", controller.status());
    println!("  synthesized:     {synthesized}");
    println!("  accepted:        {accepted}");
    println!("  dropped:         {dropped}");
    println!("  frames played:   {}", controller.frames_played());
    println!("  repaints:        {}", controller.repaint_count());
    println!("  ticks driven:    {ticks}");
    println!("  displayed time:  {:.3}", controller.displayed_time());
    println!("  terminal frame:  {terminal_seen}");
    println!(
        "  analytics:       {}",
        if controller.analytics_synchronous() {
            "synchronous"
        } else {
            "worker"
        }
    );
    println!("  stale drops:     {}", controller.dropped_stale());
    println!("  malformed drops: {}", controller.dropped_malformed());

    if let Some(viewport) = controller.viewport() {
        println!();
        println!("=== VIEWPORT ===");
        println!("  scale:   {:.4}", viewport.scale);
        println!(
            "  center:  ({:.1}, {:.1})",
            viewport.center_x, viewport.center_y
        );
    }

    if let Some(stats) = controller.last_stats() {
        println!();
        println!("=== LAST BATCH STATS ===");
        println!("  snapshots:      {}", stats.snapshot_count);
        println!("  entities:       {}", stats.entity_count);
        println!(
            "  time span:      {:.2} .. {:.2}",
            stats.first_time, stats.last_time
        );
        println!("  total distance: {:.2}", stats.total_distance);
        println!("  max step:       {:.3}", stats.max_step);
        println!("  mean step:      {:.3}", stats.mean_step);
    }

    let full_paints = sink
        .frames
        .iter()
        .filter(|frame| frame.scope.is_full())
        .count();
    println!();
    println!("=== SINK ===");
    println!("  frames delivered: {}", sink.frames.len());
    println!("  full repaints:    {full_paints}");
    if let Some(last) = sink.last() {
        println!("  last frame time:  {:.3}", last.time);
        println!("  last frame size:  {} entities", last.entities.len());
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
