use std::path::PathBuf;

/// Startup configuration problems; fatal before the pipeline starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("missing required config field `{0}`")]
    Missing(&'static str),
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// The source URL could not be bound.
#[derive(Debug, thiserror::Error)]
#[error("cannot connect to {url}: {source}")]
pub struct ConnectError {
    pub url: String,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, thiserror::Error)]
#[error("frame buffer holds {actual} bytes, {width}x{height} needs {expected}")]
pub struct FrameSizeError {
    pub width: u32,
    pub height: u32,
    pub expected: usize,
    pub actual: usize,
}

/// Failures at the encoder pipe boundary.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    #[error("encoder process closed its input pipe")]
    BrokenPipe,
    #[error("encoder process is not running")]
    NotRunning,
    #[error("cannot start encoder `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("frame is {actual} bytes, pipe carries {expected}-byte frames")]
    FrameSize { expected: usize, actual: usize },
    #[error("pipe write failed: {0}")]
    Io(#[source] std::io::Error),
}

/// A sink can no longer accept frames. Never retried; the pipeline stops.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    Pipe(#[from] PipeError),
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot create segment {path}: {source}")]
    SegmentCreate {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("cannot write segment {path}: {source}")]
    SegmentWrite {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("frame is {actual_width}x{actual_height}, sink expects {width}x{height}")]
    GeometryMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("cannot present frame: {0}")]
    Present(#[source] anyhow::Error),
}
