use std::path::Path;

use ffmpeg_next::{Dictionary, Rational, codec::packet::Packet, util::error::EAGAIN};

use crate::stream::{DemuxedPacket, VideoStream};

/// An opened demuxer and the video stream it will be decoded from.
pub struct AvInput {
    inner: ffmpeg_next::format::context::Input,
    time_bases: Vec<Rational>,
    video: VideoStream,
}

impl AvInput {
    /// Opens `url` and picks the video stream FFmpeg ranks best.
    pub fn open(url: &str, options: Option<Dictionary>) -> anyhow::Result<Self> {
        let path = Path::new(url);
        let input = match options {
            Some(opts) => ffmpeg_next::format::input_with_dictionary(path, opts)?,
            None => ffmpeg_next::format::input(path)?,
        };

        let video = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .and_then(|stream| VideoStream::probe(&stream))
            .ok_or_else(|| anyhow::anyhow!("no video stream in {}", url))?;
        let time_bases = input.streams().map(|s| s.time_base()).collect();

        Ok(Self {
            inner: input,
            time_bases,
            video,
        })
    }

    pub fn video(&self) -> &VideoStream {
        &self.video
    }

    /// Reads the next packet of any stream. `Ok(None)` is a clean end of input; any other
    /// read failure (hang-up, timeout, broken data) is an error.
    pub fn read_packet(&mut self) -> anyhow::Result<Option<DemuxedPacket>> {
        let mut packet = Packet::empty();
        loop {
            match packet.read(&mut self.inner) {
                Ok(()) => break,
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => continue,
                Err(err) => return Err(err.into()),
            }
        }
        let time_base = self
            .time_bases
            .get(packet.stream())
            .copied()
            .unwrap_or(Rational::new(1, 1_000_000));
        Ok(Some(DemuxedPacket { packet, time_base }))
    }
}
