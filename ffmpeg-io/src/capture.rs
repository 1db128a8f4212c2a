use ffmpeg_next::{Dictionary, format::Pixel, software::scaling::flag::Flags};

use crate::{decoder::Decoder, frame::VideoFrame, input::AvInput, scaler::Scaler};

/// Options handed to the demuxer when a capture is opened (`rw_timeout`, `rtsp_transport`, ...).
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    pub options: Vec<(String, String)>,
}

impl CaptureOptions {
    fn to_dictionary(&self) -> Option<Dictionary<'_>> {
        if self.options.is_empty() {
            return None;
        }
        let mut dict = Dictionary::new();
        for (key, value) in &self.options {
            dict.set(key, value);
        }
        Some(dict)
    }
}

/// An open pull-style capture: demux, decode and convert the best video stream into packed
/// BGR24 frames at the stream's native size.
pub struct Capture {
    input: AvInput,
    decoder: Decoder,
    scaler: Option<Scaler>,
    width: u32,
    height: u32,
    fps: f64,
    draining: bool,
}

unsafe impl Send for Capture {}

impl Capture {
    pub fn open(url: &str, options: &CaptureOptions) -> anyhow::Result<Self> {
        let input = AvInput::open(url, options.to_dictionary())?;
        let stream = input.video().clone();
        let decoder = Decoder::new(&stream)?;
        log::debug!(
            "capture opened: {}, stream index: {}, {}x{} @ {:.2}",
            url,
            stream.index,
            stream.width,
            stream.height,
            stream.fps()
        );

        Ok(Self {
            input,
            decoder,
            scaler: None,
            width: stream.width,
            height: stream.height,
            fps: stream.fps(),
            draining: false,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Frame rate advertised by the source, `0.0` when unknown.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Blocks until the next decoded frame. `Ok(None)` once the input has ended and the
    /// decoder is drained; read failures are returned as errors.
    pub fn read_frame(&mut self) -> anyhow::Result<Option<VideoFrame>> {
        loop {
            if let Some(frame) = self.decoder.receive_frame()? {
                return self.to_bgr(&frame).map(Some);
            }
            if self.draining {
                return Ok(None);
            }

            match self.input.read_packet()? {
                Some(packet) => {
                    if packet.stream_index() != self.decoder.stream_index() {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(packet) {
                        // a single corrupt packet is not worth dropping the connection for
                        log::warn!("capture: send packet error: {}", e);
                    }
                }
                None => {
                    self.decoder.send_eof()?;
                    self.draining = true;
                }
            }
        }
    }

    fn to_bgr(&mut self, frame: &ffmpeg_next::frame::Video) -> anyhow::Result<VideoFrame> {
        if frame.format() == Pixel::BGR24 {
            return VideoFrame::from_bgr_video(frame);
        }

        let reusable = self.scaler.as_ref().is_some_and(|s| s.accepts(frame));
        if !reusable {
            self.scaler = Some(Scaler::get(
                (frame.format(), frame.width(), frame.height()),
                (Pixel::BGR24, frame.width(), frame.height()),
                Flags::BILINEAR,
            )?);
            self.width = frame.width();
            self.height = frame.height();
        }

        let mut converted = ffmpeg_next::frame::Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.run(frame, &mut converted)?;
        }
        converted.set_pts(frame.pts());
        VideoFrame::from_bgr_video(&converted)
    }
}
