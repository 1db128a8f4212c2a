use std::path::{Path, PathBuf};

use ffmpeg_next::Rational;

use crate::{
    encoder::{Encoder, Settings},
    frame::VideoFrame,
};

/// One time-sliced output file: encodes packed BGR frames and muxes them into the container
/// implied by the file extension.
pub struct SegmentFile {
    inner: ffmpeg_next::format::context::Output,
    encoder: Encoder,
    path: PathBuf,
    stream_time_base: Rational,
    frames: u64,
    have_written_trailer: bool,
}

unsafe impl Send for SegmentFile {}

impl SegmentFile {
    /// Creates (or truncates) `path` and writes the container header.
    pub fn create(path: &Path, settings: &Settings) -> anyhow::Result<Self> {
        let mut output = ffmpeg_next::format::output(&path)?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let encoder = Encoder::new(settings, global_header)?;
        {
            let mut writer_stream = output
                .add_stream(ffmpeg_next::encoder::find_by_name(&settings.codec))?;
            writer_stream.set_parameters(encoder.as_video());
            writer_stream.set_time_base(encoder.time_base());
        }
        output.write_header()?;

        let stream_time_base = output
            .stream(0)
            .map(|s| s.time_base())
            .ok_or(anyhow::anyhow!("stream not found"))?;

        Ok(Self {
            inner: output,
            encoder,
            path: path.to_path_buf(),
            stream_time_base,
            frames: 0,
            have_written_trailer: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn write_frame(&mut self, frame: &VideoFrame) -> anyhow::Result<()> {
        if self.have_written_trailer {
            anyhow::bail!("segment {} already finished", self.path.display());
        }
        self.encoder.send_frame(frame)?;
        self.frames += 1;
        self.write_packets()
    }

    /// Pushes whatever the muxer has buffered down to the file.
    pub fn flush(&mut self) -> anyhow::Result<()> {
        unsafe {
            let pb = (*self.inner.as_mut_ptr()).pb;
            if !pb.is_null() {
                ffmpeg_next::ffi::avio_flush(pb);
            }
        }
        Ok(())
    }

    /// Drains the encoder and writes the trailer. Safe to call more than once.
    pub fn finish(&mut self) -> anyhow::Result<()> {
        if self.have_written_trailer {
            return Ok(());
        }
        self.have_written_trailer = true;
        self.encoder.send_eof()?;
        self.write_packets()?;
        self.inner.write_trailer()?;
        Ok(())
    }

    fn write_packets(&mut self) -> anyhow::Result<()> {
        while let Some(mut packet) = self.encoder.receive_packet()? {
            packet.set_stream(0);
            packet.set_position(-1);
            packet.rescale_ts(self.encoder.time_base(), self.stream_time_base);
            packet.write_interleaved(&mut self.inner)?;
        }
        Ok(())
    }
}

impl Drop for SegmentFile {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::warn!("segment {}: finish on drop failed: {:#}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
#[path = "output_test.rs"]
mod output_test;
