//! Relay pipeline: one source, one transform, one sink, one loop.
//!
//! Data Flow:
//! ```text
//!                                                      ┌─► SegmentedRecorder ─► <save_path>/<timestamp>.mp4
//!                                                      │
//! FrameSource (pull) ──► Frame ──► FrameTransform ─────┼─► PipeSink ─► encoder stdin ─► destination
//!      ▲                                               │
//!      └── reconnect (Pipeline owns the policy)        └─► DisplaySink ─► DisplayThrottle ─► snapshot
//! ```
//!
//! Frames are packed BGR24 with no row padding. A frame is produced by the source, mapped
//! once, handed to exactly one sink and then dropped.

pub mod clock;
pub mod display;
pub mod pipe_sink;
pub mod pipeline;
pub mod recorder;
pub mod sink;
pub mod source;
pub mod transform;
pub mod types;

#[cfg(test)]
pub mod fakes;
