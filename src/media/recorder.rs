use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use ffmpeg_io::{SegmentFile, Settings};

use crate::error::SinkError;
use crate::media::clock::FrameTime;
use crate::media::sink::{ensure_geometry, FrameSink};
use crate::media::types::{Frame, TargetProfile};

pub const SEGMENT_CODEC_TAG: &str = "mp4v";
pub const SEGMENT_EXTENSION: &str = "mp4";
pub const SEGMENT_FILENAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// One output file and the fixed parameters it was opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub path: PathBuf,
    pub started_at: DateTime<Local>,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec_tag: &'static str,
}

impl Segment {
    pub fn path_for(output_dir: &Path, at: DateTime<Local>) -> PathBuf {
        output_dir.join(format!(
            "{}.{}",
            at.format(SEGMENT_FILENAME_FORMAT),
            SEGMENT_EXTENSION
        ))
    }
}

pub trait SegmentWriter: Send {
    fn write(&mut self, frame: &Frame) -> anyhow::Result<()>;
    fn flush(&mut self) -> anyhow::Result<()>;
    /// Finalizes the file. Nothing is written after this.
    fn finish(&mut self) -> anyhow::Result<()>;
}

pub trait SegmentFactory: Send {
    fn create(&mut self, segment: &Segment) -> anyhow::Result<Box<dyn SegmentWriter>>;
}

struct OpenSegment {
    segment: Segment,
    opened_at: Instant,
    writer: Box<dyn SegmentWriter>,
    frames: u64,
}

/// Writes frames into successive time-boxed segment files.
///
/// A segment opens on the first frame and on the first frame at or past
/// `segment_duration` of monotonic time since the current one opened. The previous segment
/// is always finished before the next is created, so at most one is writable. Two segments
/// opened within the same second share a filename and the later one overwrites the earlier.
pub struct SegmentedRecorder<F: SegmentFactory> {
    factory: F,
    output_dir: PathBuf,
    target: TargetProfile,
    segment_duration: Duration,
    current: Option<OpenSegment>,
    last_path: Option<PathBuf>,
    segments_closed: u64,
}

impl<F: SegmentFactory> SegmentedRecorder<F> {
    pub fn new(
        factory: F,
        output_dir: impl Into<PathBuf>,
        target: TargetProfile,
        segment_duration: Duration,
    ) -> Self {
        Self {
            factory,
            output_dir: output_dir.into(),
            target,
            segment_duration,
            current: None,
            last_path: None,
            segments_closed: 0,
        }
    }

    pub fn accept(&mut self, frame: &Frame, at: FrameTime) -> Result<(), SinkError> {
        ensure_geometry(frame, &self.target)?;

        let rotate = match &self.current {
            None => true,
            Some(open) => {
                at.monotonic.saturating_duration_since(open.opened_at) >= self.segment_duration
            }
        };
        if rotate {
            if self.current.is_some() {
                log::info!("Recorder: rotating segment");
            }
            self.close();
            self.open_segment(at)?;
        }

        let Some(open) = self.current.as_mut() else {
            return Ok(());
        };
        open.writer
            .write(frame)
            .map_err(|source| SinkError::SegmentWrite {
                path: open.segment.path.clone(),
                source,
            })?;
        open.frames += 1;
        Ok(())
    }

    /// Flushes the open segment's writer. Without an open segment this is a no-op.
    pub fn flush(&mut self) -> Result<(), SinkError> {
        if let Some(open) = self.current.as_mut() {
            open.writer
                .flush()
                .map_err(|source| SinkError::SegmentWrite {
                    path: open.segment.path.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Finalizes the open segment, if any. The next `accept` opens a fresh one.
    pub fn close(&mut self) {
        let Some(mut open) = self.current.take() else {
            return;
        };
        self.segments_closed += 1;
        match open.writer.finish() {
            Ok(()) => log::info!(
                "Recorder: segment #{} saved {} ({} frames)",
                self.segments_closed,
                open.segment.path.display(),
                open.frames
            ),
            Err(e) => log::warn!(
                "Recorder: finishing segment {} failed: {:#}",
                open.segment.path.display(),
                e
            ),
        }
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    #[cfg(test)]
    pub fn segments_closed(&self) -> u64 {
        self.segments_closed
    }

    fn open_segment(&mut self, at: FrameTime) -> Result<(), SinkError> {
        let segment = Segment {
            path: Segment::path_for(&self.output_dir, at.wall),
            started_at: at.wall,
            width: self.target.width,
            height: self.target.height,
            fps: self.target.fps,
            codec_tag: SEGMENT_CODEC_TAG,
        };
        if self.last_path.as_ref() == Some(&segment.path) {
            log::warn!(
                "Recorder: segment {} opened twice within one second, overwriting",
                segment.path.display()
            );
        }

        let writer = self
            .factory
            .create(&segment)
            .map_err(|source| SinkError::SegmentCreate {
                path: segment.path.clone(),
                source,
            })?;
        log::info!("Recorder: new segment {}", segment.path.display());
        self.last_path = Some(segment.path.clone());
        self.current = Some(OpenSegment {
            segment,
            opened_at: at.monotonic,
            writer,
            frames: 0,
        });
        Ok(())
    }
}

impl<F: SegmentFactory> FrameSink for SegmentedRecorder<F> {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn start(&mut self) -> Result<(), SinkError> {
        if !self.output_dir.is_dir() {
            std::fs::create_dir_all(&self.output_dir).map_err(|source| SinkError::OutputDir {
                path: self.output_dir.clone(),
                source,
            })?;
            log::info!("Recorder: created directory {}", self.output_dir.display());
        }
        Ok(())
    }

    fn accept(&mut self, frame: Frame, at: FrameTime) -> Result<(), SinkError> {
        SegmentedRecorder::accept(self, &frame, at)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        SegmentedRecorder::flush(self)
    }

    fn source_lost(&mut self) {
        // a partial segment must not stay open across an outage of unknown length
        SegmentedRecorder::close(self);
    }

    fn close(&mut self) {
        SegmentedRecorder::close(self);
    }
}

impl<F: SegmentFactory> Drop for SegmentedRecorder<F> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Segment files encoded through ffmpeg.
#[derive(Debug, Default)]
pub struct FfmpegSegments;

impl SegmentFactory for FfmpegSegments {
    fn create(&mut self, segment: &Segment) -> anyhow::Result<Box<dyn SegmentWriter>> {
        let settings = Settings {
            width: segment.width,
            height: segment.height,
            keyframe_interval: segment.fps.round().max(1.0) as u32,
            ..Settings::default()
        }
        .with_fps(segment.fps);
        let file = SegmentFile::create(&segment.path, &settings)?;
        Ok(Box::new(FfmpegSegmentWriter { file }))
    }
}

struct FfmpegSegmentWriter {
    file: SegmentFile,
}

impl SegmentWriter for FfmpegSegmentWriter {
    fn write(&mut self, frame: &Frame) -> anyhow::Result<()> {
        self.file.write_frame(&frame.to_video_frame())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.file.flush()
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.file.finish()
    }
}

#[cfg(test)]
#[path = "recorder_test.rs"]
mod recorder_test;
