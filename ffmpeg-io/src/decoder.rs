use ffmpeg_next::{Rational, codec::Context, format::Pixel, frame::Video, util::error::EAGAIN};

use crate::stream::{DemuxedPacket, VideoStream};

/// Decodes the packets of one video stream.
pub struct Decoder {
    stream_index: usize,
    inner: ffmpeg_next::codec::decoder::Video,
    time_base: Rational,
}

impl Decoder {
    pub fn new(stream: &VideoStream) -> anyhow::Result<Self> {
        let mut context = Context::new();
        unsafe {
            (*context.as_mut_ptr()).time_base = stream.time_base.into();
        }
        context.set_parameters(stream.parameters.clone())?;

        let inner = context.decoder().video()?;
        if inner.format() == Pixel::None || inner.width() == 0 || inner.height() == 0 {
            anyhow::bail!("stream {} lacks codec parameters", stream.index);
        }

        Ok(Self {
            stream_index: stream.index,
            time_base: inner.time_base(),
            inner,
        })
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn send_packet(&mut self, mut demuxed: DemuxedPacket) -> anyhow::Result<()> {
        demuxed.packet.rescale_ts(demuxed.time_base, self.time_base);
        self.inner.send_packet(&demuxed.packet)?;
        Ok(())
    }

    pub fn send_eof(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()?;
        Ok(())
    }

    /// `Ok(None)` when the decoder wants more input or has been drained.
    pub fn receive_frame(&mut self) -> anyhow::Result<Option<Video>> {
        let mut frame = Video::empty();
        match self.inner.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
