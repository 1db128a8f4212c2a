use crate::error::SinkError;
use crate::media::clock::FrameTime;
use crate::media::types::{Frame, TargetProfile};

/// Where transformed frames end up. Exactly one sink is active per pipeline.
pub trait FrameSink: Send {
    fn name(&self) -> &'static str;

    /// Acquires whatever the sink needs before the first frame (directory, encoder process).
    fn start(&mut self) -> Result<(), SinkError>;

    /// Takes ownership of one frame. An error is terminal for the pipeline.
    fn accept(&mut self, frame: Frame, at: FrameTime) -> Result<(), SinkError>;

    /// Pushes buffered output down to its destination. Called when the source drops, before
    /// `source_lost`, so that an output failure is reported instead of swallowed on close.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// The source dropped; release connection-scoped resources.
    fn source_lost(&mut self);

    /// Releases everything. Called on every exit path, more than once is harmless.
    fn close(&mut self);
}

/// Sinks do not resize: frames must already have the target shape.
pub fn ensure_geometry(frame: &Frame, target: &TargetProfile) -> Result<(), SinkError> {
    if frame.has_shape(target.width, target.height) {
        return Ok(());
    }
    Err(SinkError::GeometryMismatch {
        width: target.width,
        height: target.height,
        actual_width: frame.width(),
        actual_height: frame.height(),
    })
}
