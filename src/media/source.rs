use std::fmt::{Display, Formatter};

use ffmpeg_io::{Capture, CaptureOptions};

use crate::error::ConnectError;
use crate::media::types::{Frame, StreamInfo};

/// Opens pull-style connections. The ffmpeg capture in production; scripted fakes in tests.
pub trait CaptureBackend: Send {
    fn connect(&mut self, url: &str) -> anyhow::Result<Box<dyn StreamConnection>>;
}

/// A capture handle bound to one URL.
pub trait StreamConnection: Send {
    fn info(&self) -> StreamInfo;

    /// Next frame in arrival order. `Ok(None)` when the upstream ended cleanly.
    fn read(&mut self) -> anyhow::Result<Option<Frame>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Failed,
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum ReadOutcome {
    Frame(Frame),
    EndOfStream,
}

/// Owns the one connection to the upstream stream.
///
/// `open` never retries and `read_frame` never reconnects: a failed read drops the
/// connection and reports [`ReadOutcome::EndOfStream`] once, leaving the retry policy to the
/// caller. No frame is buffered beyond the one being returned.
pub struct FrameSource {
    backend: Box<dyn CaptureBackend>,
    connection: Option<Box<dyn StreamConnection>>,
    state: ConnectionState,
    url: String,
}

impl FrameSource {
    pub fn new(backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            connection: None,
            state: ConnectionState::Disconnected,
            url: String::new(),
        }
    }

    pub fn open(&mut self, url: &str) -> Result<StreamInfo, ConnectError> {
        self.close();
        self.url = url.to_string();
        self.state = ConnectionState::Connecting;
        log::info!("FrameSource: connecting to {}", url);

        match self.backend.connect(url) {
            Ok(connection) => {
                let info = connection.info();
                log::info!(
                    "FrameSource: connected to {} ({}x{} @ {} FPS)",
                    url,
                    info.width,
                    info.height,
                    info.fps
                );
                self.connection = Some(connection);
                self.state = ConnectionState::Open;
                Ok(info)
            }
            Err(source) => {
                self.state = ConnectionState::Failed;
                Err(ConnectError {
                    url: url.to_string(),
                    source,
                })
            }
        }
    }

    pub fn read_frame(&mut self) -> ReadOutcome {
        let Some(connection) = self.connection.as_mut() else {
            return ReadOutcome::EndOfStream;
        };

        match connection.read() {
            Ok(Some(frame)) => ReadOutcome::Frame(frame),
            Ok(None) => {
                log::warn!("FrameSource: {} ended", self.url);
                self.drop_connection();
                ReadOutcome::EndOfStream
            }
            Err(e) => {
                log::warn!("FrameSource: read from {} failed: {:#}", self.url, e);
                self.drop_connection();
                ReadOutcome::EndOfStream
            }
        }
    }

    pub fn close(&mut self) {
        if self.connection.take().is_some() {
            log::info!("FrameSource: closed {}", self.url);
        }
        self.state = ConnectionState::Disconnected;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn info(&self) -> Option<StreamInfo> {
        self.connection.as_ref().map(|c| c.info())
    }

    fn drop_connection(&mut self) {
        self.connection = None;
        self.state = ConnectionState::Failed;
    }
}

/// Production backend: each connection is an ffmpeg capture converting to packed BGR.
pub struct FfmpegBackend {
    options: CaptureOptions,
}

impl FfmpegBackend {
    pub fn new(options: CaptureOptions) -> Self {
        Self { options }
    }
}

impl CaptureBackend for FfmpegBackend {
    fn connect(&mut self, url: &str) -> anyhow::Result<Box<dyn StreamConnection>> {
        let capture = Capture::open(url, &self.options)?;
        Ok(Box::new(FfmpegConnection { capture }))
    }
}

struct FfmpegConnection {
    capture: Capture,
}

impl StreamConnection for FfmpegConnection {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            width: self.capture.width(),
            height: self.capture.height(),
            fps: self.capture.fps(),
        }
    }

    fn read(&mut self) -> anyhow::Result<Option<Frame>> {
        match self.capture.read_frame()? {
            Some(frame) => Ok(Some(Frame::try_from(frame)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[path = "source_test.rs"]
mod source_test;
