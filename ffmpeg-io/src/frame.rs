use std::fmt::{Display, Formatter};

use bytes::Bytes;
use ffmpeg_next::format::Pixel;

/// Packed BGR24 picture: rows back to back, three bytes per pixel, no padding.
#[derive(Debug, Clone, Default)]
pub struct VideoFrame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub pts: i64,
}

impl VideoFrame {
    pub const BYTES_PER_PIXEL: usize = 3;

    pub fn new(data: Vec<u8>, width: u32, height: u32, pts: i64) -> Self {
        Self {
            data: Bytes::from(data),
            width,
            height,
            pts,
        }
    }

    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * Self::BYTES_PER_PIXEL
    }

    /// Copies a BGR24 ffmpeg frame out of its strided planes.
    pub(crate) fn from_bgr_video(frame: &ffmpeg_next::frame::Video) -> anyhow::Result<Self> {
        if frame.format() != Pixel::BGR24 {
            anyhow::bail!("expected bgr24 frame, got {:?}", frame.format());
        }
        let width = frame.width();
        let height = frame.height();
        let row = width as usize * Self::BYTES_PER_PIXEL;
        let stride = frame.stride(0);
        let plane = frame.data(0);

        let mut data = Vec::with_capacity(Self::expected_len(width, height));
        for y in 0..height as usize {
            let start = y * stride;
            data.extend_from_slice(&plane[start..start + row]);
        }
        Ok(Self::new(data, width, height, frame.pts().unwrap_or(0)))
    }

    /// Lays the packed bytes out into a freshly allocated BGR24 ffmpeg frame.
    pub(crate) fn to_bgr_video(&self) -> anyhow::Result<ffmpeg_next::frame::Video> {
        if self.width == 0 || self.height == 0 {
            anyhow::bail!("invalid video size {}x{}", self.width, self.height);
        }
        let expected = Self::expected_len(self.width, self.height);
        if self.data.len() != expected {
            anyhow::bail!(
                "frame holds {} bytes, {}x{} bgr24 needs {}",
                self.data.len(),
                self.width,
                self.height,
                expected
            );
        }

        let mut frame = ffmpeg_next::frame::Video::new(Pixel::BGR24, self.width, self.height);
        let row = self.width as usize * Self::BYTES_PER_PIXEL;
        let stride = frame.stride(0);
        let plane = frame.data_mut(0);
        for (y, src) in self.data.chunks_exact(row).enumerate() {
            let start = y * stride;
            plane[start..start + row].copy_from_slice(src);
        }
        frame.set_pts(Some(self.pts));
        Ok(frame)
    }
}

impl Display for VideoFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "VideoFrame data_len: {}, width: {}, height: {}, pts: {}",
            self.data.len(),
            self.width,
            self.height,
            self.pts
        )
    }
}
