use std::cell::RefCell;

use ffmpeg_io::Resizer;

use crate::media::types::{Frame, TargetProfile};

/// Per-frame mapping between the source and the sink.
///
/// Implementations keep no state across calls beyond their configuration, and every output
/// frame has the same shape and color layout so sinks never need to know what produced it.
pub trait FrameTransform: Send {
    fn apply(&self, frame: Frame) -> Frame;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl FrameTransform for Identity {
    fn apply(&self, frame: Frame) -> Frame {
        frame
    }
}

/// Bilinear resize to the target shape, done by swscale.
///
/// The cell only caches the scaling context for the current source shape; output depends
/// on nothing but the input frame and the target.
pub struct Resize {
    resizer: RefCell<Resizer>,
}

impl Resize {
    pub fn new(target: &TargetProfile) -> Self {
        Self {
            resizer: RefCell::new(Resizer::new(target.width, target.height)),
        }
    }
}

impl FrameTransform for Resize {
    fn apply(&self, frame: Frame) -> Frame {
        let mut resizer = self.resizer.borrow_mut();
        if frame.has_shape(resizer.width(), resizer.height()) {
            return frame;
        }
        let resized = resizer
            .resize(&frame.to_video_frame())
            .and_then(|scaled| Ok(Frame::try_from(scaled)?));
        match resized {
            Ok(resized) => resized,
            Err(e) => {
                // the sink's geometry check turns this into a pipeline stop
                log::error!(
                    "Resize: {}x{} -> {}x{} failed: {:#}",
                    frame.width(),
                    frame.height(),
                    resizer.width(),
                    resizer.height(),
                    e
                );
                frame
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(width: u32, height: u32) -> TargetProfile {
        TargetProfile {
            width,
            height,
            fps: 30.0,
        }
    }

    fn solid(width: u32, height: u32, bgr: [u8; 3]) -> Frame {
        let data: Vec<u8> = bgr
            .iter()
            .copied()
            .cycle()
            .take(Frame::packed_len(width, height))
            .collect();
        Frame::new(data, width, height).unwrap()
    }

    #[test]
    fn test_identity_passes_through() {
        let frame = solid(4, 4, [1, 2, 3]);
        let out = Identity.apply(frame);
        assert_eq!(out.pixel(3, 3), [1, 2, 3]);
    }

    #[test]
    fn test_resize_matching_shape_is_untouched() {
        let data: Vec<u8> = (0..48).collect();
        let frame = Frame::new(data.clone(), 4, 4).unwrap();
        let out = Resize::new(&target(4, 4)).apply(frame);
        assert_eq!(out.data(), &data[..]);
    }

    #[test]
    fn test_resize_output_shape() {
        let out = Resize::new(&target(96, 54)).apply(solid(160, 90, [10, 20, 30]));
        assert_eq!((out.width(), out.height()), (96, 54));
        assert_eq!(out.len(), 96 * 54 * 3);
        let [b, g, r] = out.pixel(95, 53);
        assert!(b.abs_diff(10) <= 1 && g.abs_diff(20) <= 1 && r.abs_diff(30) <= 1);
    }

    #[test]
    fn test_resize_keeps_layout() {
        // left half black, right half white
        let (width, height) = (64u32, 48u32);
        let mut data = Vec::with_capacity(Frame::packed_len(width, height));
        for _ in 0..height {
            for x in 0..width {
                let v = if x < width / 2 { 0 } else { 255 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        let frame = Frame::new(data, width, height).unwrap();

        let out = Resize::new(&target(32, 24)).apply(frame);
        assert_eq!((out.width(), out.height()), (32, 24));
        assert!(out.pixel(0, 12)[0] < 32);
        assert!(out.pixel(31, 12)[0] > 223);
    }

    #[test]
    fn test_resize_follows_source_shape_changes() {
        let resize = Resize::new(&target(32, 24));
        let a = resize.apply(solid(64, 48, [0, 0, 0]));
        let b = resize.apply(solid(128, 72, [200, 200, 200]));
        assert!(a.has_shape(32, 24));
        assert!(b.has_shape(32, 24));
    }
}
