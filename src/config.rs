use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::media::display::frame_interval;
use crate::media::pipe_sink::EncoderCommand;
use crate::media::types::TargetProfile;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const DEFAULT_OUTPUT_DIR: &str = "videos/";
pub const DEFAULT_SEGMENT_DURATION: Duration = Duration::from_secs(30);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on the recording frame rate; faster sources are written at this rate.
pub const MAX_RECORD_FPS: f64 = 62.5;
/// Demuxer read timeout in microseconds, so a silent source is noticed.
pub const DEFAULT_RW_TIMEOUT_US: &str = "10000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkMode {
    #[default]
    Record,
    Relay,
    View,
}

impl FromStr for SinkMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "record" => Ok(SinkMode::Record),
            "relay" => Ok(SinkMode::Relay),
            "view" => Ok(SinkMode::View),
            other => Err(ConfigError::Invalid {
                field: "mode",
                reason: format!("unknown mode `{}`", other),
            }),
        }
    }
}

impl Display for SinkMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        let name = match self {
            SinkMode::Record => "record",
            SinkMode::Relay => "relay",
            SinkMode::View => "view",
        };
        f.write_str(name)
    }
}

/// How the pipeline retries after the source drops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: Some(1),
        }
    }
}

impl ReconnectPolicy {
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayConfig {
    pub snapshot_path: PathBuf,
    pub fps: f64,
    pub quality: u8,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("latest.jpg"),
            fps: 30.0,
            quality: 85,
        }
    }
}

/// Everything the pipeline needs, resolved once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mode: SinkMode,
    pub source_url: String,
    pub destination_url: Option<String>,
    pub output_dir: PathBuf,
    pub target: TargetProfile,
    pub segment_duration: Duration,
    pub reconnect: ReconnectPolicy,
    pub encoder: EncoderCommand,
    pub encoder_stop_timeout: Duration,
    pub display: DisplayConfig,
    pub source_options: Vec<(String, String)>,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Reads the YAML file at `path` and applies command-line overrides on top.
    pub fn load(path: &Path, overrides: &CliOverrides) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawConfig = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        raw.into_builder()?.apply(overrides).build()
    }
}

/// Values given on the command line; they win over the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub mode: Option<SinkMode>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    mode: SinkMode,
    source_url: Option<String>,
    destination_url: Option<String>,
    output_dir: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<f64>,
    segment_duration: Option<Duration>,
    reconnect: ReconnectPolicy,
    encoder: Option<EncoderCommand>,
    encoder_stop_timeout: Option<Duration>,
    display: DisplayConfig,
    source_options: Option<Vec<(String, String)>>,
}

impl PipelineConfigBuilder {
    pub fn mode(mut self, mode: SinkMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn destination_url(mut self, url: impl Into<String>) -> Self {
        self.destination_url = Some(url.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn target(mut self, width: u32, height: u32, fps: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self.fps = Some(fps);
        self
    }

    pub fn segment_duration(mut self, duration: Duration) -> Self {
        self.segment_duration = Some(duration);
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn encoder(mut self, command: EncoderCommand) -> Self {
        self.encoder = Some(command);
        self
    }

    pub fn encoder_stop_timeout(mut self, timeout: Duration) -> Self {
        self.encoder_stop_timeout = Some(timeout);
        self
    }

    pub fn display(mut self, display: DisplayConfig) -> Self {
        self.display = display;
        self
    }

    pub fn source_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.source_options
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    pub fn apply(mut self, overrides: &CliOverrides) -> Self {
        if let Some(mode) = overrides.mode {
            self.mode = mode;
        }
        self.width = overrides.width.or(self.width);
        self.height = overrides.height.or(self.height);
        self.fps = overrides.fps.or(self.fps);
        self
    }

    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let source_url = self
            .source_url
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("source.url"))?;
        let destination_url = self.destination_url.filter(|url| !url.trim().is_empty());
        if self.mode == SinkMode::Relay && destination_url.is_none() {
            return Err(ConfigError::Missing("destination.url"));
        }

        let width = self.width.unwrap_or(960);
        let height = self.height.unwrap_or(540);
        if width == 0 || height == 0 {
            return Err(ConfigError::Invalid {
                field: "target",
                reason: format!("{}x{} has no pixels", width, height),
            });
        }
        let mut fps = self.fps.unwrap_or(30.0);
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "target.fps",
                reason: format!("{} is not a positive frame rate", fps),
            });
        }
        if self.mode == SinkMode::Record && fps > MAX_RECORD_FPS {
            log::warn!(
                "Config: recording fps {} capped at {}",
                fps,
                MAX_RECORD_FPS
            );
            fps = MAX_RECORD_FPS;
        }

        let segment_duration = self.segment_duration.unwrap_or(DEFAULT_SEGMENT_DURATION);
        if segment_duration.is_zero() {
            return Err(ConfigError::Invalid {
                field: "segment_duration_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        let encoder_stop_timeout = self.encoder_stop_timeout.unwrap_or(DEFAULT_STOP_TIMEOUT);
        if encoder_stop_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "encoder.stop_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if frame_interval(self.display.fps).is_none() {
            return Err(ConfigError::Invalid {
                field: "display.fps",
                reason: format!("{} is not a usable frame rate", self.display.fps),
            });
        }

        Ok(PipelineConfig {
            mode: self.mode,
            source_url,
            destination_url,
            output_dir: self
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            target: TargetProfile { width, height, fps },
            segment_duration,
            reconnect: self.reconnect,
            encoder: self.encoder.unwrap_or_default(),
            encoder_stop_timeout,
            display: self.display,
            source_options: self.source_options.unwrap_or_else(|| {
                vec![("rw_timeout".to_string(), DEFAULT_RW_TIMEOUT_US.to_string())]
            }),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct UrlSection {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TargetSection {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ReconnectSection {
    delay_secs: Option<f64>,
    // 0 means unlimited
    max_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct EncoderSection {
    program: Option<String>,
    args: Option<Vec<String>>,
    stop_timeout_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct DisplaySection {
    snapshot_path: Option<PathBuf>,
    fps: Option<f64>,
    quality: Option<u8>,
}

/// On-disk layout. Older files name the source after its protocol and the destination
/// after the push side, so both spellings are accepted.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    mode: Option<SinkMode>,
    #[serde(alias = "rtmp_pull", alias = "rtmp", alias = "rtsp")]
    source: Option<UrlSection>,
    #[serde(alias = "rtmp_push")]
    destination: Option<UrlSection>,
    save_path: Option<PathBuf>,
    target: Option<TargetSection>,
    segment_duration_secs: Option<f64>,
    reconnect: Option<ReconnectSection>,
    encoder: Option<EncoderSection>,
    display: Option<DisplaySection>,
    source_options: Option<BTreeMap<String, serde_yaml::Value>>,
}

impl RawConfig {
    fn into_builder(self) -> Result<PipelineConfigBuilder, ConfigError> {
        let mut builder = PipelineConfig::builder();
        if let Some(mode) = self.mode {
            builder = builder.mode(mode);
        }
        if let Some(url) = self.source.and_then(|s| s.url) {
            builder = builder.source_url(url);
        }
        if let Some(url) = self.destination.and_then(|s| s.url) {
            builder = builder.destination_url(url);
        }
        if let Some(dir) = self.save_path {
            builder = builder.output_dir(dir);
        }
        if let Some(target) = self.target {
            builder.width = target.width;
            builder.height = target.height;
            builder.fps = target.fps;
        }
        if let Some(secs) = self.segment_duration_secs {
            builder = builder.segment_duration(secs_duration("segment_duration_secs", secs)?);
        }
        if let Some(reconnect) = self.reconnect {
            let mut policy = ReconnectPolicy::default();
            if let Some(secs) = reconnect.delay_secs {
                policy.delay = secs_duration("reconnect.delay_secs", secs)?;
            }
            if let Some(max) = reconnect.max_attempts {
                policy.max_attempts = (max > 0).then_some(max);
            }
            builder = builder.reconnect(policy);
        }
        if let Some(encoder) = self.encoder {
            let mut command = EncoderCommand::default();
            if let Some(program) = encoder.program {
                command.program = program;
            }
            if let Some(args) = encoder.args {
                command.args = args;
            }
            builder = builder.encoder(command);
            if let Some(secs) = encoder.stop_timeout_secs {
                let timeout = secs_duration("encoder.stop_timeout_secs", secs)?;
                builder = builder.encoder_stop_timeout(timeout);
            }
        }
        if let Some(display) = self.display {
            let mut config = DisplayConfig::default();
            if let Some(path) = display.snapshot_path {
                config.snapshot_path = path;
            }
            if let Some(fps) = display.fps {
                config.fps = fps;
            }
            if let Some(quality) = display.quality {
                config.quality = quality;
            }
            builder = builder.display(config);
        }
        if let Some(options) = self.source_options {
            for (key, value) in options {
                builder = builder.source_option(key, yaml_scalar(&value));
            }
        }
        Ok(builder)
    }
}

fn secs_duration(field: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::Invalid {
        field,
        reason: format!("{} is not a non-negative number of seconds", secs),
    })
}

fn yaml_scalar(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
