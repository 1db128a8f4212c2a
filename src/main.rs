use std::path::PathBuf;
use std::sync::Arc;

use clap::{value_parser, Arg, ArgMatches, Command};
use tokio_util::sync::CancellationToken;

use crate::config::{CliOverrides, PipelineConfig, SinkMode, DEFAULT_CONFIG_PATH};
use crate::error::ConfigError;

mod config;
mod error;
mod media;

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("YAML configuration file")
                .default_value(DEFAULT_CONFIG_PATH)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .help("What to do with the pulled stream")
                .value_parser(["record", "relay", "view"]),
        )
        .arg(
            Arg::new("width")
                .long("width")
                .help("Target frame width")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("height")
                .long("height")
                .help("Target frame height")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("fps")
                .long("fps")
                .help("Target frame rate")
                .value_parser(value_parser!(f64)),
        )
}

fn overrides(matches: &ArgMatches) -> Result<CliOverrides, ConfigError> {
    let mode = match matches.get_one::<String>("mode") {
        Some(mode) => Some(mode.parse::<SinkMode>()?),
        None => None,
    };
    Ok(CliOverrides {
        mode,
        width: matches.get_one::<u32>("width").copied(),
        height: matches.get_one::<u32>("height").copied(),
        fps: matches.get_one::<f64>("fps").copied(),
    })
}

fn load_config(matches: &ArgMatches) -> Result<PipelineConfig, ConfigError> {
    let path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    PipelineConfig::load(&path, &overrides(matches)?)
}

#[tokio::main]
async fn main() -> ! {
    init_logging();
    let matches = cli().get_matches();

    let config = match load_config(&matches) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(2);
        }
    };
    if let Err(e) = ffmpeg_io::init() {
        log::error!("{:#}", e);
        std::process::exit(1);
    }

    let cancel = CancellationToken::new();
    let pipeline_cancel = cancel.clone();
    let mut pipeline =
        tokio::task::spawn_blocking(move || media::pipeline::launch(config, pipeline_cancel));

    let result = loop {
        tokio::select! {
            result = &mut pipeline => break result,
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                log::info!("interrupt received, stopping");
                cancel.cancel();
            },
        }
    };

    let code = match result {
        Ok(Ok(report)) => {
            log::info!(
                "stopped: {} ({} frames, {} reconnects)",
                report.reason,
                report.frames,
                report.reconnects
            );
            if report.reason.is_clean() { 0 } else { 1 }
        }
        Ok(Err(e)) => {
            log::error!("{}", e);
            2
        }
        Err(e) => {
            log::error!("pipeline task failed: {}", e);
            1
        }
    };
    std::process::exit(code);
}
