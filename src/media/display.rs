use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use jpeg_encoder::{ColorType, Encoder};

use crate::error::SinkError;
use crate::media::clock::FrameTime;
use crate::media::sink::{ensure_geometry, FrameSink};
use crate::media::types::{Frame, TargetProfile};

/// Time between frames at `fps`, or `None` when no finite positive interval exists for it.
pub fn frame_interval(fps: f64) -> Option<Duration> {
    if !fps.is_finite() || fps <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / fps)
        .ok()
        .filter(|interval| !interval.is_zero())
}

/// Lossy pacing: a frame is emitted only if a full frame interval has passed since the last
/// emitted one. Skipped frames are dropped, never queued.
#[derive(Debug, Clone)]
pub struct DisplayThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl DisplayThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn should_emit(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }

    /// Earliest instant the next frame would be emitted; `None` before the first.
    #[cfg(test)]
    pub fn next_emit_at(&self) -> Option<Instant> {
        self.last_emit.map(|last| last + self.interval)
    }
}

/// Shows an emitted frame to whoever is watching.
pub trait FramePresenter: Send {
    fn present(&mut self, frame: &Frame) -> anyhow::Result<()>;
}

/// Keeps the latest emitted frame as a JPEG file, swapped in atomically so readers never
/// see a half-written image.
pub struct JpegSnapshot {
    path: PathBuf,
    tmp_path: PathBuf,
    quality: u8,
}

impl JpegSnapshot {
    pub fn new(path: impl Into<PathBuf>, quality: u8) -> Self {
        let path = path.into();
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        Self {
            path,
            tmp_path: tmp.into(),
            quality: quality.clamp(1, 100),
        }
    }
}

impl FramePresenter for JpegSnapshot {
    fn present(&mut self, frame: &Frame) -> anyhow::Result<()> {
        let width = u16::try_from(frame.width()).context("frame too wide for jpeg")?;
        let height = u16::try_from(frame.height()).context("frame too tall for jpeg")?;

        let mut buf = Vec::new();
        Encoder::new(&mut buf, self.quality).encode(frame.data(), width, height, ColorType::Bgr)?;

        std::fs::write(&self.tmp_path, &buf)
            .with_context(|| format!("write {}", self.tmp_path.display()))?;
        std::fs::rename(&self.tmp_path, &self.path)
            .with_context(|| format!("replace {}", self.path.display()))?;
        Ok(())
    }
}

/// Viewer sink: paces frames with a [`DisplayThrottle`] and hands the survivors to a
/// presenter.
pub struct DisplaySink<P: FramePresenter> {
    throttle: DisplayThrottle,
    presenter: P,
    target: TargetProfile,
    emitted: u64,
    dropped: u64,
}

impl<P: FramePresenter> DisplaySink<P> {
    pub fn new(presenter: P, target: TargetProfile, interval: Duration) -> Self {
        Self {
            throttle: DisplayThrottle::new(interval),
            presenter,
            target,
            emitted: 0,
            dropped: 0,
        }
    }

    #[cfg(test)]
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    #[cfg(test)]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl<P: FramePresenter> FrameSink for DisplaySink<P> {
    fn name(&self) -> &'static str {
        "viewer"
    }

    fn start(&mut self) -> Result<(), SinkError> {
        log::info!(
            "Viewer: presenting at up to {:.1} FPS",
            1.0 / self.throttle.interval().as_secs_f64()
        );
        Ok(())
    }

    fn accept(&mut self, frame: Frame, at: FrameTime) -> Result<(), SinkError> {
        ensure_geometry(&frame, &self.target)?;
        if !self.throttle.should_emit(at.monotonic) {
            self.dropped += 1;
            return Ok(());
        }
        self.presenter.present(&frame).map_err(SinkError::Present)?;
        self.emitted += 1;
        Ok(())
    }

    fn source_lost(&mut self) {}

    fn close(&mut self) {
        if self.emitted + self.dropped > 0 {
            log::info!(
                "Viewer: {} frames shown, {} dropped",
                self.emitted,
                self.dropped
            );
        }
    }
}

#[cfg(test)]
#[path = "display_test.rs"]
mod display_test;
