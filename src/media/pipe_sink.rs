use std::io::{ErrorKind, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::error::{PipeError, SinkError};
use crate::media::clock::FrameTime;
use crate::media::sink::{ensure_geometry, FrameSink};
use crate::media::types::{Frame, TargetProfile};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Program and argument template for the external encoder.
///
/// Arguments may contain `{width}`, `{height}`, `{fps}` and `{destination}`; they are
/// substituted once when the process is spawned. The process reads raw `bgr24` frames of
/// exactly `width * height * 3` bytes from stdin, with no framing in between.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EncoderCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for EncoderCommand {
    fn default() -> Self {
        let args = [
            "-y", "-f", "rawvideo", "-vcodec", "rawvideo", "-pix_fmt", "bgr24", "-s",
            "{width}x{height}", "-r", "{fps}", "-i", "-", "-c:v", "libx264", "-pix_fmt",
            "yuv420p", "-preset", "ultrafast", "-f", "flv", "{destination}",
        ];
        Self {
            program: "ffmpeg".to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EncoderCommand {
    pub fn render(&self, target: &TargetProfile, destination: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{width}", &target.width.to_string())
                    .replace("{height}", &target.height.to_string())
                    .replace("{fps}", &target.fps.to_string())
                    .replace("{destination}", destination)
            })
            .collect()
    }
}

/// A running encoder and the write end of its stdin.
pub struct EncoderProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    program: String,
    status: Option<ExitStatus>,
}

impl EncoderProcess {
    pub fn spawn(
        command: &EncoderCommand,
        target: &TargetProfile,
        destination: &str,
    ) -> Result<Self, PipeError> {
        let mut child = Command::new(&command.program)
            .args(command.render(target, destination))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|source| PipeError::Spawn {
                program: command.program.clone(),
                source,
            })?;
        let stdin = child.stdin.take();
        Ok(Self {
            child,
            stdin,
            program: command.program.clone(),
            status: None,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Writes one whole frame. Once the peer is seen gone the pipe is dropped for good.
    pub fn write_frame(&mut self, bytes: &[u8]) -> Result<(), PipeError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(PipeError::BrokenPipe);
        };
        match stdin.write_all(bytes) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                self.stdin = None;
                Err(PipeError::BrokenPipe)
            }
            Err(e) => Err(PipeError::Io(e)),
        }
    }

    pub fn has_exited(&mut self) -> bool {
        if self.status.is_some() {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.status = Some(status);
                true
            }
            Ok(None) => false,
            Err(e) => {
                log::warn!("Encoder: cannot poll {}: {}", self.program, e);
                false
            }
        }
    }

    /// Close the pipe, wait up to `timeout` for a clean exit, then kill. Idempotent.
    pub fn stop(&mut self, timeout: Duration) -> Option<ExitStatus> {
        drop(self.stdin.take());

        let deadline = Instant::now() + timeout;
        while !self.has_exited() {
            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "Encoder: {} (pid {}) did not exit within {:?}, killing",
                    self.program,
                    self.child.id(),
                    timeout
                );
                if let Err(e) = self.child.kill() {
                    log::warn!("Encoder: kill failed: {}", e);
                }
                match self.child.wait() {
                    Ok(status) => self.status = Some(status),
                    Err(e) => log::warn!("Encoder: wait after kill failed: {}", e),
                }
                break;
            }
            std::thread::sleep(STOP_POLL_INTERVAL.min(deadline - now));
        }
        self.status
    }
}

impl Drop for EncoderProcess {
    fn drop(&mut self) {
        if self.status.is_none() {
            self.stop(Duration::ZERO);
        }
    }
}

/// Relays frames as raw bytes into an external encoder process.
///
/// A closed pipe is terminal: the sink never writes again and never respawns the encoder.
pub struct PipeSink {
    command: EncoderCommand,
    destination: String,
    target: TargetProfile,
    stop_timeout: Duration,
    process: Option<EncoderProcess>,
    broken: bool,
    bytes_written: u64,
    frames_written: u64,
}

impl PipeSink {
    pub fn new(
        command: EncoderCommand,
        destination: impl Into<String>,
        target: TargetProfile,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            command,
            destination: destination.into(),
            target,
            stop_timeout,
            process: None,
            broken: false,
            bytes_written: 0,
            frames_written: 0,
        }
    }

    pub fn start(&mut self) -> Result<(), PipeError> {
        if self.process.is_some() {
            return Ok(());
        }
        let process = EncoderProcess::spawn(&self.command, &self.target, &self.destination)?;
        log::info!(
            "PipeSink: encoder {} started (pid {}) -> {} ({})",
            self.command.program,
            process.id(),
            self.destination,
            self.target
        );
        self.process = Some(process);
        self.broken = false;
        Ok(())
    }

    /// Writes the whole frame before returning, blocking while the encoder is behind.
    pub fn accept(&mut self, frame: &Frame) -> Result<(), PipeError> {
        if self.broken {
            return Err(PipeError::BrokenPipe);
        }
        let expected = self.target.frame_len();
        if frame.len() != expected {
            return Err(PipeError::FrameSize {
                expected,
                actual: frame.len(),
            });
        }
        let process = self.process.as_mut().ok_or(PipeError::NotRunning)?;

        match process.write_frame(frame.data()) {
            Ok(()) => {
                self.bytes_written += frame.len() as u64;
                self.frames_written += 1;
                Ok(())
            }
            Err(PipeError::BrokenPipe) => {
                log::error!(
                    "PipeSink: encoder closed its pipe after {} frames",
                    self.frames_written
                );
                self.broken = true;
                Err(PipeError::BrokenPipe)
            }
            Err(e) => Err(e),
        }
    }

    pub fn stop(&mut self) {
        let Some(mut process) = self.process.take() else {
            return;
        };
        let status = process.stop(self.stop_timeout);
        log::info!(
            "PipeSink: encoder stopped ({}), {} frames ({} bytes) relayed",
            status.map_or("killed".to_string(), |s| s.to_string()),
            self.frames_written,
            self.bytes_written
        );
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    #[cfg(test)]
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    #[cfg(test)]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    #[cfg(test)]
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl FrameSink for PipeSink {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn start(&mut self) -> Result<(), SinkError> {
        Ok(PipeSink::start(self)?)
    }

    fn accept(&mut self, frame: Frame, _at: FrameTime) -> Result<(), SinkError> {
        ensure_geometry(&frame, &self.target)?;
        Ok(PipeSink::accept(self, &frame)?)
    }

    fn source_lost(&mut self) {
        // the encoder outlives source hiccups; a dead one surfaces on the next write
        if let Some(process) = self.process.as_mut() {
            if process.has_exited() {
                log::warn!("PipeSink: encoder exited while the source was down");
            }
        }
    }

    fn close(&mut self) {
        self.stop();
    }
}

impl Drop for PipeSink {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "pipe_sink_test.rs"]
mod pipe_sink_test;
