//! Scripted stand-ins for the capture backend and the segment muxer.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::media::clock::ManualClock;
use crate::media::recorder::{Segment, SegmentFactory, SegmentWriter};
use crate::media::source::{CaptureBackend, StreamConnection};
use crate::media::types::{Frame, StreamInfo};

/// Builds a frame whose first four bytes carry `id`.
pub fn tagged_frame(id: u32, width: u32, height: u32) -> Frame {
    let mut data = vec![0u8; Frame::packed_len(width, height)];
    data[..4].copy_from_slice(&id.to_le_bytes());
    Frame::new(data, width, height).unwrap()
}

pub fn frame_id(frame: &Frame) -> u32 {
    let mut id = [0u8; 4];
    id.copy_from_slice(&frame.data()[..4]);
    u32::from_le_bytes(id)
}

#[derive(Debug, Clone, Copy)]
pub enum Event {
    /// Deliver `n` frames.
    Frames(u32),
    /// The read fails; the connection is gone.
    Fail,
    /// Fire the cancellation token, then deliver one more frame.
    Cancel,
}

#[derive(Debug, Clone)]
pub enum Session {
    Refuse,
    Accept(Vec<Event>),
}

/// Counters shared between a test and the backend it handed to the pipeline.
#[derive(Debug, Default)]
pub struct Probe {
    pub connects: AtomicUsize,
    pub open: AtomicUsize,
    pub delivered: AtomicUsize,
}

impl Probe {
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

/// Each `connect` consumes the next session; running out of sessions refuses.
pub struct ScriptedBackend {
    sessions: VecDeque<Session>,
    info: StreamInfo,
    frame_interval: Duration,
    clock: Option<Arc<ManualClock>>,
    cancel: CancellationToken,
    probe: Arc<Probe>,
    next_id: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new(sessions: Vec<Session>, width: u32, height: u32, fps: f64) -> Self {
        Self {
            sessions: sessions.into(),
            info: StreamInfo { width, height, fps },
            frame_interval: Duration::from_secs_f64(1.0 / fps),
            clock: None,
            cancel: CancellationToken::new(),
            probe: Arc::new(Probe::default()),
            next_id: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Advance `clock` by one frame interval after each delivered frame.
    pub fn with_clock(mut self, clock: Arc<ManualClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn probe(&self) -> Arc<Probe> {
        self.probe.clone()
    }
}

impl CaptureBackend for ScriptedBackend {
    fn connect(&mut self, url: &str) -> anyhow::Result<Box<dyn StreamConnection>> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        match self.sessions.pop_front() {
            Some(Session::Accept(events)) => {
                self.probe.open.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(ScriptedConnection {
                    events: events.into(),
                    info: self.info,
                    frame_interval: self.frame_interval,
                    clock: self.clock.clone(),
                    cancel: self.cancel.clone(),
                    probe: self.probe.clone(),
                    next_id: self.next_id.clone(),
                }))
            }
            Some(Session::Refuse) | None => anyhow::bail!("connection to {} refused", url),
        }
    }
}

struct ScriptedConnection {
    events: VecDeque<Event>,
    info: StreamInfo,
    frame_interval: Duration,
    clock: Option<Arc<ManualClock>>,
    cancel: CancellationToken,
    probe: Arc<Probe>,
    next_id: Arc<AtomicUsize>,
}

impl ScriptedConnection {
    fn deliver(&mut self) -> Frame {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as u32;
        self.probe.delivered.fetch_add(1, Ordering::SeqCst);
        tagged_frame(id, self.info.width, self.info.height)
    }
}

impl StreamConnection for ScriptedConnection {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn read(&mut self) -> anyhow::Result<Option<Frame>> {
        // time moves between frames, never before the first one
        if self.probe.delivered() > 0 {
            if let Some(clock) = &self.clock {
                clock.advance(self.frame_interval);
            }
        }
        loop {
            match self.events.front_mut() {
                Some(Event::Frames(0)) => {
                    self.events.pop_front();
                }
                Some(Event::Frames(n)) => {
                    *n -= 1;
                    return Ok(Some(self.deliver()));
                }
                Some(Event::Fail) => {
                    self.events.pop_front();
                    anyhow::bail!("scripted read failure");
                }
                Some(Event::Cancel) => {
                    self.events.pop_front();
                    self.cancel.cancel();
                    return Ok(Some(self.deliver()));
                }
                None => anyhow::bail!("script exhausted"),
            }
        }
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.probe.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What one in-memory segment received.
#[derive(Debug, Clone)]
pub struct SegmentRecord {
    pub segment: Segment,
    pub frames: Vec<u32>,
    pub finished: bool,
    pub flushes: usize,
}

#[derive(Default)]
pub struct MemorySegments {
    records: Arc<Mutex<Vec<SegmentRecord>>>,
    fail_create_at: Option<usize>,
    fail_write_at: Option<usize>,
    fail_flush: bool,
}

impl MemorySegments {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `index`-th `create` call (0-based) fails.
    pub fn failing_create_at(mut self, index: usize) -> Self {
        self.fail_create_at = Some(index);
        self
    }

    /// Writing the `index`-th frame overall (0-based) fails.
    pub fn failing_write_at(mut self, index: usize) -> Self {
        self.fail_write_at = Some(index);
        self
    }

    /// Every `flush` on every writer fails.
    pub fn failing_flush(mut self) -> Self {
        self.fail_flush = true;
        self
    }

    pub fn records(&self) -> Arc<Mutex<Vec<SegmentRecord>>> {
        self.records.clone()
    }
}

impl SegmentFactory for MemorySegments {
    fn create(&mut self, segment: &Segment) -> anyhow::Result<Box<dyn SegmentWriter>> {
        let mut records = self.records.lock().unwrap();
        if self.fail_create_at == Some(records.len()) {
            anyhow::bail!("disk full");
        }
        records.push(SegmentRecord {
            segment: segment.clone(),
            frames: Vec::new(),
            finished: false,
            flushes: 0,
        });
        Ok(Box::new(MemoryWriter {
            records: self.records.clone(),
            index: records.len() - 1,
            fail_write_at: self.fail_write_at,
            fail_flush: self.fail_flush,
        }))
    }
}

struct MemoryWriter {
    records: Arc<Mutex<Vec<SegmentRecord>>>,
    index: usize,
    fail_write_at: Option<usize>,
    fail_flush: bool,
}

impl SegmentWriter for MemoryWriter {
    fn write(&mut self, frame: &Frame) -> anyhow::Result<()> {
        let mut records = self.records.lock().unwrap();
        let written: usize = records.iter().map(|r| r.frames.len()).sum();
        if self.fail_write_at == Some(written) {
            anyhow::bail!("write failed");
        }
        let record = &mut records[self.index];
        assert!(!record.finished, "write to a finished segment");
        record.frames.push(frame_id(frame));
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        if self.fail_flush {
            anyhow::bail!("flush failed");
        }
        self.records.lock().unwrap()[self.index].flushes += 1;
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.records.lock().unwrap()[self.index].finished = true;
        Ok(())
    }
}

pub fn segment_paths(records: &Arc<Mutex<Vec<SegmentRecord>>>) -> Vec<PathBuf> {
    records
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.segment.path.clone())
        .collect()
}
