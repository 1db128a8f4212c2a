use ffmpeg_next::{Rational, format::Pixel, picture, software::scaling::flag::Flags};

use crate::{frame::VideoFrame, scaler::Scaler};

#[derive(Debug, Clone)]
pub struct Settings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
    pub keyframe_interval: u32,
    pub bit_rate: usize,
    // ffmpeg encoder name, "mpeg4" is what the `mp4v` tag maps to
    pub codec: String,
    pub pixel_format: Pixel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            width: 960,
            height: 540,
            frame_rate: Rational::new(30, 1),
            keyframe_interval: 30,
            bit_rate: 2_000_000,
            codec: "mpeg4".to_string(),
            pixel_format: Pixel::YUV420P,
        }
    }
}

impl Settings {
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.frame_rate = Rational::from(fps);
        self
    }
}

/// Video encoder fed with packed BGR frames; converts to the codec's pixel format.
pub struct Encoder {
    inner: ffmpeg_next::codec::encoder::Video,
    encoder_time_base: Rational,
    keyframe_interval: i64,
    frame_index: i64,
    scaler: Option<Scaler>,
}

impl Encoder {
    pub fn new(settings: &Settings, global_header: bool) -> anyhow::Result<Self> {
        let codec = ffmpeg_next::encoder::find_by_name(&settings.codec)
            .ok_or(anyhow::anyhow!("codec not found: {}", settings.codec))?;

        let mut encoder = ffmpeg_next::codec::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        encoder.set_width(settings.width);
        encoder.set_height(settings.height);
        encoder.set_format(settings.pixel_format);
        encoder.set_frame_rate(Some(settings.frame_rate));
        encoder.set_time_base(settings.frame_rate.invert());
        encoder.set_bit_rate(settings.bit_rate);
        encoder.set_gop(settings.keyframe_interval);
        if global_header {
            encoder.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder.open_as(codec)?;
        let encoder_time_base: Rational = unsafe { (*encoder.0.as_ptr()).time_base.into() };
        log::info!(
            "encoder opened: {}, {}x{}, time_base: {}",
            settings.codec,
            settings.width,
            settings.height,
            encoder_time_base
        );

        Ok(Self {
            inner: encoder,
            encoder_time_base,
            keyframe_interval: settings.keyframe_interval.max(1) as i64,
            frame_index: 0,
            scaler: None,
        })
    }

    pub fn time_base(&self) -> Rational {
        self.encoder_time_base
    }

    pub fn as_video(&self) -> &ffmpeg_next::codec::encoder::Video {
        &self.inner
    }

    pub fn send_frame(&mut self, frame: &VideoFrame) -> anyhow::Result<()> {
        let source = frame.to_bgr_video()?;

        let reusable = self.scaler.as_ref().is_some_and(|s| s.accepts(&source));
        if !reusable {
            self.scaler = Some(Scaler::get(
                (source.format(), source.width(), source.height()),
                (self.inner.format(), self.inner.width(), self.inner.height()),
                Flags::empty(),
            )?);
        }

        let mut converted = ffmpeg_next::frame::Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.run(&source, &mut converted)?;
        }
        // arrival order, one tick per frame
        converted.set_pts(Some(self.frame_index));
        if self.frame_index % self.keyframe_interval == 0 {
            converted.set_kind(picture::Type::I);
        }
        self.inner.send_frame(&converted)?;
        self.frame_index += 1;
        Ok(())
    }

    pub fn send_eof(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()?;
        Ok(())
    }

    /// `Ok(None)` when the encoder needs more input or is fully drained.
    pub fn receive_packet(&mut self) -> anyhow::Result<Option<ffmpeg_next::codec::packet::Packet>> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        match self.inner.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(packet)),
            Err(ffmpeg_next::Error::Other { errno })
                if errno == ffmpeg_next::util::error::EAGAIN =>
            {
                Ok(None)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
