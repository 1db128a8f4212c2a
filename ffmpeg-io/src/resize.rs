use ffmpeg_next::{format::Pixel, frame::Video, software::scaling::flag::Flags};

use crate::{frame::VideoFrame, scaler::Scaler};

/// Bilinear BGR24 → BGR24 resize to a fixed output shape through swscale.
///
/// The scaling context is built for the first source shape seen and rebuilt only when the
/// source shape changes.
pub struct Resizer {
    width: u32,
    height: u32,
    scaler: Option<Scaler>,
}

impl Resizer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            scaler: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resize(&mut self, frame: &VideoFrame) -> anyhow::Result<VideoFrame> {
        if frame.width == self.width && frame.height == self.height {
            return Ok(frame.clone());
        }
        let source = frame.to_bgr_video()?;

        let reusable = self.scaler.as_ref().is_some_and(|s| s.accepts(&source));
        if !reusable {
            self.scaler = Some(Scaler::get(
                (Pixel::BGR24, frame.width, frame.height),
                (Pixel::BGR24, self.width, self.height),
                Flags::BILINEAR,
            )?);
        }

        let mut scaled = Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.run(&source, &mut scaled)?;
        }
        scaled.set_pts(Some(frame.pts));
        VideoFrame::from_bgr_video(&scaled)
    }
}
