use super::{ConnectionState, FrameSource, ReadOutcome};
use crate::media::fakes::{frame_id, Event, ScriptedBackend, Session};

fn source(sessions: Vec<Session>) -> (FrameSource, std::sync::Arc<crate::media::fakes::Probe>) {
    let backend = ScriptedBackend::new(sessions, 32, 24, 10.0);
    let probe = backend.probe();
    (FrameSource::new(Box::new(backend)), probe)
}

#[test]
fn test_open_reports_stream_info() {
    let (mut source, probe) = source(vec![Session::Accept(vec![Event::Frames(1)])]);
    let info = source.open("rtmp://localhost/live/a").unwrap();
    assert_eq!((info.width, info.height), (32, 24));
    assert_eq!(source.state(), ConnectionState::Open);
    assert_eq!(probe.open_connections(), 1);
}

#[test]
fn test_open_failure_is_not_retried() {
    let (mut source, probe) = source(vec![Session::Refuse, Session::Accept(vec![])]);
    let err = source.open("rtmp://localhost/live/a").unwrap_err();
    assert_eq!(err.url, "rtmp://localhost/live/a");
    assert_eq!(probe.connects(), 1);
    assert_eq!(source.state(), ConnectionState::Failed);
}

#[test]
fn test_frames_in_arrival_order() {
    let (mut source, _) = source(vec![Session::Accept(vec![Event::Frames(3)])]);
    source.open("rtsp://cam").unwrap();
    let ids: Vec<u32> = (0..3)
        .map(|_| match source.read_frame() {
            ReadOutcome::Frame(frame) => frame_id(&frame),
            ReadOutcome::EndOfStream => panic!("unexpected end of stream"),
        })
        .collect();
    assert_eq!(ids, vec![0, 1, 2]);
}

#[test]
fn test_read_failure_signals_end_of_stream_and_drops_connection() {
    let (mut source, probe) = source(vec![Session::Accept(vec![
        Event::Frames(1),
        Event::Fail,
        Event::Frames(5),
    ])]);
    source.open("rtsp://cam").unwrap();

    assert!(matches!(source.read_frame(), ReadOutcome::Frame(_)));
    assert!(matches!(source.read_frame(), ReadOutcome::EndOfStream));
    assert_eq!(source.state(), ConnectionState::Failed);
    assert_eq!(probe.open_connections(), 0);

    // no frame ever comes out of a failed source, and it does not reconnect on its own
    assert!(matches!(source.read_frame(), ReadOutcome::EndOfStream));
    assert_eq!(probe.connects(), 1);
    assert_eq!(probe.delivered(), 1);
}

#[test]
fn test_reopen_after_failure() {
    let (mut source, probe) = source(vec![
        Session::Accept(vec![Event::Fail]),
        Session::Accept(vec![Event::Frames(1)]),
    ]);
    source.open("rtsp://cam").unwrap();
    assert!(matches!(source.read_frame(), ReadOutcome::EndOfStream));

    source.open("rtsp://cam").unwrap();
    assert_eq!(source.state(), ConnectionState::Open);
    assert!(matches!(source.read_frame(), ReadOutcome::Frame(_)));
    assert_eq!(probe.connects(), 2);
}

#[test]
fn test_close_releases_connection() {
    let (mut source, probe) = source(vec![Session::Accept(vec![Event::Frames(10)])]);
    source.open("rtsp://cam").unwrap();
    source.close();
    assert_eq!(source.state(), ConnectionState::Disconnected);
    assert!(source.info().is_none());
    assert_eq!(probe.open_connections(), 0);
}
