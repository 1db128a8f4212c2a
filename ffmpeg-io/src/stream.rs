use ffmpeg_next::{Rational, codec::Parameters, format::stream::Stream, media};

/// Snapshot of the video stream a capture decodes, taken when the input is opened.
#[derive(Clone)]
pub struct VideoStream {
    pub index: usize,
    pub parameters: Parameters,
    pub time_base: Rational,
    pub frame_rate: Rational,
    pub width: u32,
    pub height: u32,
}

// Parameters is an owned copy of the codec parameters, detached from the format context.
unsafe impl Send for VideoStream {}

impl VideoStream {
    /// `None` unless `stream` carries video.
    pub fn probe(stream: &Stream<'_>) -> Option<Self> {
        let parameters = stream.parameters();
        if parameters.medium() != media::Type::Video {
            return None;
        }
        let (width, height) = unsafe {
            let raw = &*parameters.as_ptr();
            (raw.width.max(0) as u32, raw.height.max(0) as u32)
        };
        Some(Self {
            index: stream.index(),
            parameters,
            time_base: stream.time_base(),
            frame_rate: stream.avg_frame_rate(),
            width,
            height,
        })
    }

    /// Average frame rate, `0.0` when the container does not say.
    pub fn fps(&self) -> f64 {
        let (num, den) = (self.frame_rate.numerator(), self.frame_rate.denominator());
        if num > 0 && den > 0 {
            num as f64 / den as f64
        } else {
            0.0
        }
    }
}

/// A demuxed packet and the time base its timestamps are expressed in.
pub struct DemuxedPacket {
    pub packet: ffmpeg_next::codec::packet::Packet,
    pub time_base: Rational,
}

impl DemuxedPacket {
    pub fn stream_index(&self) -> usize {
        self.packet.stream()
    }
}
