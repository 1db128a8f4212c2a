use std::time::{Duration, Instant};

use super::{EncoderCommand, EncoderProcess, PipeSink};
use crate::error::{PipeError, SinkError};
use crate::media::clock::{FrameTime, SystemClock};
use crate::media::fakes::tagged_frame;
use crate::media::sink::FrameSink;
use crate::media::types::{Frame, TargetProfile};

const HD: TargetProfile = TargetProfile {
    width: 960,
    height: 540,
    fps: 30.0,
};

const SMALL: TargetProfile = TargetProfile {
    width: 32,
    height: 24,
    fps: 10.0,
};

fn sh(script: &str) -> EncoderCommand {
    EncoderCommand {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string(), "{destination}".to_string()],
    }
}

fn wait_exit(process: &mut EncoderProcess) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !process.has_exited() {
        assert!(Instant::now() < deadline, "process did not exit");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_default_command_renders_relay_profile() {
    let args = EncoderCommand::default().render(&HD, "rtmp://example/live/out");
    assert_eq!(
        args.join(" "),
        "-y -f rawvideo -vcodec rawvideo -pix_fmt bgr24 -s 960x540 -r 30 -i - \
         -c:v libx264 -pix_fmt yuv420p -preset ultrafast -f flv rtmp://example/live/out"
    );
}

#[test]
fn test_render_fractional_fps() {
    let target = TargetProfile {
        fps: 29.97,
        ..HD
    };
    let args = EncoderCommand {
        program: "enc".to_string(),
        args: vec!["{fps}".to_string(), "{width}:{height}".to_string()],
    }
    .render(&target, "x");
    assert_eq!(args, vec!["29.97", "960:540"]);
}

#[cfg(unix)]
#[test]
fn test_each_accept_writes_one_whole_frame() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("pipe.raw");
    let mut sink = PipeSink::new(
        sh("cat > \"$0\""),
        out.to_string_lossy(),
        HD,
        Duration::from_secs(5),
    );
    sink.start().unwrap();

    for i in 0..3u64 {
        sink.accept(&tagged_frame(i as u32, 960, 540)).unwrap();
        assert_eq!(sink.bytes_written(), (i + 1) * 1_555_200);
    }
    sink.stop();

    assert!(!sink.is_running());
    let written = std::fs::read(&out).unwrap();
    assert_eq!(written.len(), 3 * 1_555_200);
    // frames arrive back to back in order
    assert_eq!(&written[1_555_200..1_555_204], &1u32.to_le_bytes());
    assert_eq!(&written[2 * 1_555_200..2 * 1_555_200 + 4], &2u32.to_le_bytes());
}

#[cfg(unix)]
#[test]
fn test_accept_after_peer_exit_is_broken_pipe() {
    let mut sink = PipeSink::new(sh("exit 0"), "-", SMALL, Duration::from_secs(5));
    sink.start().unwrap();
    wait_exit(sink.process.as_mut().unwrap());

    let err = sink.accept(&tagged_frame(0, 32, 24)).unwrap_err();
    assert!(matches!(err, PipeError::BrokenPipe));
    assert!(sink.is_broken());

    // never written to again
    let err = sink.accept(&tagged_frame(1, 32, 24)).unwrap_err();
    assert!(matches!(err, PipeError::BrokenPipe));
    assert_eq!(sink.bytes_written(), 0);
    assert_eq!(sink.frames_written(), 0);
}

#[cfg(unix)]
#[test]
fn test_peer_closing_mid_frame_does_not_block() {
    let mut sink = PipeSink::new(
        sh("head -c 100 > /dev/null"),
        "-",
        HD,
        Duration::from_secs(5),
    );
    sink.start().unwrap();

    let started = Instant::now();
    let mut result = Ok(());
    for i in 0..50 {
        result = sink.accept(&tagged_frame(i, 960, 540));
        if result.is_err() {
            break;
        }
    }
    assert!(matches!(result, Err(PipeError::BrokenPipe)));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[cfg(unix)]
#[test]
fn test_stop_kills_encoder_that_ignores_eof() {
    let mut sink = PipeSink::new(
        EncoderCommand {
            program: "sleep".to_string(),
            args: vec!["30".to_string()],
        },
        "-",
        SMALL,
        Duration::from_millis(200),
    );
    sink.start().unwrap();

    let started = Instant::now();
    sink.stop();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!sink.is_running());
    // second stop is a no-op
    sink.stop();
}

#[cfg(unix)]
#[test]
fn test_stop_waits_for_clean_exit() {
    let mut process = EncoderProcess::spawn(&sh("cat > /dev/null"), &SMALL, "-").unwrap();
    let status = process.stop(Duration::from_secs(5)).unwrap();
    assert!(status.success());
    assert_eq!(process.stop(Duration::from_secs(5)), Some(status));
}

#[test]
fn test_accept_before_start_is_not_running() {
    let mut sink = PipeSink::new(EncoderCommand::default(), "-", SMALL, Duration::from_secs(5));
    let err = sink.accept(&tagged_frame(0, 32, 24)).unwrap_err();
    assert!(matches!(err, PipeError::NotRunning));
}

#[test]
fn test_frame_size_is_checked() {
    let mut sink = PipeSink::new(EncoderCommand::default(), "-", SMALL, Duration::from_secs(5));
    let frame = Frame::new(vec![0u8; 16 * 12 * 3], 16, 12).unwrap();
    let err = sink.accept(&frame).unwrap_err();
    assert!(matches!(
        err,
        PipeError::FrameSize {
            expected: 2304,
            actual: 576
        }
    ));
}

#[test]
fn test_sink_rejects_wrong_geometry() {
    let mut sink = PipeSink::new(EncoderCommand::default(), "-", SMALL, Duration::from_secs(5));
    let err = FrameSink::accept(
        &mut sink,
        tagged_frame(0, 64, 48),
        FrameTime::now(&SystemClock),
    )
    .unwrap_err();
    assert!(matches!(err, SinkError::GeometryMismatch { .. }));
}

#[test]
fn test_spawn_failure() {
    let mut sink = PipeSink::new(
        EncoderCommand {
            program: "/nonexistent/encoder".to_string(),
            args: vec![],
        },
        "-",
        SMALL,
        Duration::from_secs(5),
    );
    let err = sink.start().unwrap_err();
    assert!(matches!(err, PipeError::Spawn { .. }));
    assert!(!sink.is_running());
}
