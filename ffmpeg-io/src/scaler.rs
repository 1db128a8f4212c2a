use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context, flag::Flags};

/// Software pixel-format converter with a fixed source and destination shape.
pub struct Scaler {
    context: Context,
    source: (Pixel, u32, u32),
}

impl Scaler {
    pub fn get(
        src: (Pixel, u32, u32),
        dst: (Pixel, u32, u32),
        flags: Flags,
    ) -> anyhow::Result<Self> {
        let context = Context::get(src.0, src.1, src.2, dst.0, dst.1, dst.2, flags)?;
        Ok(Self {
            context,
            source: src,
        })
    }

    /// Whether a frame of this shape can go through the scaler unchanged.
    pub fn accepts(&self, frame: &ffmpeg_next::frame::Video) -> bool {
        self.source == (frame.format(), frame.width(), frame.height())
    }

    pub fn run(
        &mut self,
        frame: &ffmpeg_next::frame::Video,
        dst: &mut ffmpeg_next::frame::Video,
    ) -> anyhow::Result<()> {
        self.context.run(frame, dst).map_err(|e| e.into())
    }
}

unsafe impl Send for Scaler {}
