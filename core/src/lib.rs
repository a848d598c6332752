//! Playback core for streaming simulation snapshots.
//!
//! A producer emits bursts of world snapshots at whatever cadence it
//! likes; this crate buffers them, replays them at a smooth frame rate,
//! tracks which parts of the surface need repainting, frames the scene
//! once per run, and ships movement analytics to a background worker.
//! Painting and transport stay on the host's side of the
//! [`render::RenderSink`] and [`ingress::IngressHandle`] seams.
//!
//! Drive it from the host's frame loop:
//! [`controller::PlaybackController::tick`] with the current `Instant`.

pub mod analytics;
pub mod config;
pub mod controller;
pub mod dirty;
pub mod error;
pub mod ingress;
pub mod offload;
pub mod queue;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod types;
pub mod viewport;
