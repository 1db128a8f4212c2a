use std::fmt::{Display, Formatter};
use std::sync::Arc;

use ffmpeg_io::CaptureOptions;
use tokio_util::sync::CancellationToken;

use crate::config::{PipelineConfig, SinkMode};
use crate::error::{ConfigError, ConnectError, SinkError};
use crate::media::clock::{Clock, FrameTime, SystemClock};
use crate::media::display::{frame_interval, DisplaySink, JpegSnapshot};
use crate::media::pipe_sink::PipeSink;
use crate::media::recorder::{FfmpegSegments, SegmentedRecorder};
use crate::media::sink::FrameSink;
use crate::media::source::{FfmpegBackend, FrameSource, ReadOutcome};
use crate::media::transform::{FrameTransform, Resize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Starting,
    Streaming,
    Reconnecting,
    Stopping,
    Stopped,
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        let name = match self {
            PipelineState::Starting => "starting",
            PipelineState::Streaming => "streaming",
            PipelineState::Reconnecting => "reconnecting",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum StopReason {
    /// Operator interrupt.
    Cancelled,
    /// The initial open failed.
    ConnectFailed(ConnectError),
    /// The source dropped and every allowed reconnect attempt failed.
    ReconnectFailed { attempts: u32, error: ConnectError },
    SinkFailed(SinkError),
}

impl StopReason {
    /// Whether the pipeline stopped because it was asked to.
    pub fn is_clean(&self) -> bool {
        matches!(self, StopReason::Cancelled)
    }
}

impl Display for StopReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::ConnectFailed(e) => write!(f, "{}", e),
            StopReason::ReconnectFailed { attempts, error } => {
                write!(f, "gave up after {} reconnect attempt(s): {}", attempts, error)
            }
            StopReason::SinkFailed(e) => write!(f, "sink failed: {}", e),
        }
    }
}

#[derive(Debug)]
pub struct PipelineReport {
    pub reason: StopReason,
    pub frames: u64,
    pub reconnects: u32,
}

/// Source, transform and sink driven by one synchronous loop.
///
/// The loop holds at most one frame at a time, so a slow sink stalls reads instead of
/// queueing. Cancellation is checked between frames and during the reconnect wait, and every
/// exit path releases the sink and the connection before reaching `Stopped`.
pub struct Pipeline<K: FrameSink> {
    config: Arc<PipelineConfig>,
    source: FrameSource,
    transform: Box<dyn FrameTransform>,
    sink: K,
    clock: Arc<dyn Clock>,
    state: PipelineState,
    history: Vec<PipelineState>,
    frames: u64,
    reconnects: u32,
}

impl<K: FrameSink> Pipeline<K> {
    pub fn new(
        config: Arc<PipelineConfig>,
        source: FrameSource,
        transform: Box<dyn FrameTransform>,
        sink: K,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            source,
            transform,
            sink,
            clock,
            state: PipelineState::Starting,
            history: vec![PipelineState::Starting],
            frames: 0,
            reconnects: 0,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state entered so far, in order.
    #[cfg(test)]
    pub fn transitions(&self) -> &[PipelineState] {
        &self.history
    }

    #[cfg(test)]
    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn run(&mut self, cancel: &CancellationToken) -> PipelineReport {
        log::info!(
            "Pipeline: {} from {} ({})",
            self.sink.name(),
            self.config.source_url,
            self.config.target
        );
        let reason = self.stream(cancel);
        self.shutdown(&reason);
        PipelineReport {
            reason,
            frames: self.frames,
            reconnects: self.reconnects,
        }
    }

    fn stream(&mut self, cancel: &CancellationToken) -> StopReason {
        if cancel.is_cancelled() {
            return StopReason::Cancelled;
        }
        if let Err(e) = self.source.open(&self.config.source_url) {
            return StopReason::ConnectFailed(e);
        }
        if let Err(e) = self.sink.start() {
            return StopReason::SinkFailed(e);
        }
        self.enter(PipelineState::Streaming);

        loop {
            if cancel.is_cancelled() {
                return StopReason::Cancelled;
            }
            match self.source.read_frame() {
                ReadOutcome::Frame(frame) => {
                    let frame = self.transform.apply(frame);
                    let at = FrameTime::now(self.clock.as_ref());
                    if let Err(e) = self.sink.accept(frame, at) {
                        return StopReason::SinkFailed(e);
                    }
                    self.frames += 1;
                }
                ReadOutcome::EndOfStream => {
                    if cancel.is_cancelled() {
                        return StopReason::Cancelled;
                    }
                    if let Err(e) = self.sink.flush() {
                        return StopReason::SinkFailed(e);
                    }
                    self.enter(PipelineState::Reconnecting);
                    self.sink.source_lost();
                    if let Err(reason) = self.reconnect(cancel) {
                        return reason;
                    }
                    self.enter(PipelineState::Streaming);
                }
            }
        }
    }

    fn reconnect(&mut self, cancel: &CancellationToken) -> Result<(), StopReason> {
        let policy = self.config.reconnect;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            log::info!(
                "Pipeline: reconnecting in {:?} (attempt {})",
                policy.delay,
                attempt
            );
            if !self.clock.sleep(policy.delay, cancel) {
                return Err(StopReason::Cancelled);
            }
            match self.source.open(&self.config.source_url) {
                Ok(_) => {
                    self.reconnects += 1;
                    return Ok(());
                }
                Err(error) if !policy.allows(attempt + 1) => {
                    return Err(StopReason::ReconnectFailed {
                        attempts: attempt,
                        error,
                    });
                }
                Err(error) => log::warn!("Pipeline: {:#}", error),
            }
        }
    }

    fn shutdown(&mut self, reason: &StopReason) {
        if self.state == PipelineState::Streaming {
            self.enter(PipelineState::Stopping);
        }
        self.sink.close();
        self.source.close();
        if reason.is_clean() {
            log::info!("Pipeline: {} frames, {} reconnects", self.frames, self.reconnects);
        } else {
            log::error!("Pipeline: {}", reason);
        }
        self.enter(PipelineState::Stopped);
    }

    fn enter(&mut self, state: PipelineState) {
        log::info!("Pipeline: {} -> {}", self.state, state);
        self.state = state;
        self.history.push(state);
    }
}

/// Builds the production pipeline for `config.mode` and runs it to completion.
pub fn launch(
    config: Arc<PipelineConfig>,
    cancel: CancellationToken,
) -> Result<PipelineReport, ConfigError> {
    let backend = FfmpegBackend::new(CaptureOptions {
        options: config.source_options.clone(),
    });
    let source = FrameSource::new(Box::new(backend));
    let transform = Box::new(Resize::new(&config.target));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let report = match config.mode {
        SinkMode::Record => {
            let sink = SegmentedRecorder::new(
                FfmpegSegments,
                config.output_dir.clone(),
                config.target,
                config.segment_duration,
            );
            run(config, source, transform, sink, clock, &cancel)
        }
        SinkMode::Relay => {
            let destination = config
                .destination_url
                .clone()
                .ok_or(ConfigError::Missing("destination.url"))?;
            let sink = PipeSink::new(
                config.encoder.clone(),
                destination,
                config.target,
                config.encoder_stop_timeout,
            );
            run(config, source, transform, sink, clock, &cancel)
        }
        SinkMode::View => {
            let presenter =
                JpegSnapshot::new(config.display.snapshot_path.clone(), config.display.quality);
            let interval = frame_interval(config.display.fps).ok_or(ConfigError::Invalid {
                field: "display.fps",
                reason: format!("{} is not a usable frame rate", config.display.fps),
            })?;
            let sink = DisplaySink::new(presenter, config.target, interval);
            run(config, source, transform, sink, clock, &cancel)
        }
    };
    Ok(report)
}

fn run<K: FrameSink>(
    config: Arc<PipelineConfig>,
    source: FrameSource,
    transform: Box<dyn FrameTransform>,
    sink: K,
    clock: Arc<dyn Clock>,
    cancel: &CancellationToken,
) -> PipelineReport {
    Pipeline::new(config, source, transform, sink, clock).run(cancel)
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
