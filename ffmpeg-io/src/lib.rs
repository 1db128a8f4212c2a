//! Thin FFmpeg layer used by the relay: pull-style capture that yields packed BGR frames,
//! a swscale resizer for those frames, and a segment muxer that turns them back into a
//! playable file.

/// Registers FFmpeg components (formats, network protocols). Call once at startup.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))?;
    ffmpeg_next::format::network::init();
    Ok(())
}

pub mod capture;
pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod input;
pub mod output;
pub mod resize;
pub mod scaler;
pub mod stream;

pub use capture::{Capture, CaptureOptions};
pub use encoder::Settings;
pub use frame::VideoFrame;
pub use output::SegmentFile;
pub use resize::Resizer;
