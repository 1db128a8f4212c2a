use std::fmt::{Display, Formatter};

use bytes::Bytes;
use ffmpeg_io::VideoFrame;

use crate::error::FrameSizeError;

/// Shape every frame is normalised to before it reaches a sink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetProfile {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl TargetProfile {
    /// Bytes one frame of this shape occupies on the wire.
    pub fn frame_len(&self) -> usize {
        Frame::packed_len(self.width, self.height)
    }
}

impl Display for TargetProfile {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}x{} @ {} FPS", self.width, self.height, self.fps)
    }
}

/// What the source negotiated when the connection opened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    // 0.0 when the source does not advertise a rate
    pub fps: f64,
}

/// One decoded picture: packed BGR24, row-major, no padding.
///
/// Deliberately not `Clone`: a frame is handed from the source through one transform to one
/// sink and dropped at the end of the pipeline iteration.
#[derive(Debug)]
pub struct Frame {
    data: Bytes,
    width: u32,
    height: u32,
}

impl Frame {
    pub const BYTES_PER_PIXEL: usize = 3;

    pub fn new(data: impl Into<Bytes>, width: u32, height: u32) -> Result<Self, FrameSizeError> {
        let data = data.into();
        let expected = Self::packed_len(width, height);
        if data.len() != expected {
            return Err(FrameSizeError {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn packed_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * Self::BYTES_PER_PIXEL
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The three channel bytes of the pixel at `(x, y)`.
    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let at = (y as usize * self.width as usize + x as usize) * Self::BYTES_PER_PIXEL;
        [self.data[at], self.data[at + 1], self.data[at + 2]]
    }

    pub fn has_shape(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    /// Backend view of the same bytes; the encoder assigns its own timestamps.
    pub fn to_video_frame(&self) -> VideoFrame {
        VideoFrame {
            data: self.data.clone(),
            width: self.width,
            height: self.height,
            pts: 0,
        }
    }
}

impl TryFrom<VideoFrame> for Frame {
    type Error = FrameSizeError;

    fn try_from(value: VideoFrame) -> Result<Self, Self::Error> {
        Frame::new(value.data, value.width, value.height)
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "Frame {{ {}x{}, data: {} }}",
            self.width,
            self.height,
            self.data.len()
        )
    }
}
