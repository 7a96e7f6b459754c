use bytes::Bytes;

/// A compressed packet as read from the demuxer.
///
/// Timestamps are in ticks of the owning stream's timebase; either may be absent.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Compressed payload, passed through to the emitted sample as is.
    pub data: Bytes,
    /// Presentation timestamp in ticks.
    pub pts: Option<i64>,
    /// Decode timestamp in ticks. With B-frames it runs ahead of `pts` and may
    /// start below the stream's start time.
    pub dts: Option<i64>,
    pub stream_index: usize,
    /// Keyframe flag. Only reported on the emitted sample; rewinds seek by time.
    pub is_key: bool,
}

impl Packet {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: None,
            dts: None,
            stream_index: 0,
            is_key: false,
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    pub fn with_stream_index(mut self, stream_index: usize) -> Self {
        self.stream_index = stream_index;
        self
    }

    pub fn with_key_flag(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    /// Presentation position in ticks, the unit stream start times and seek
    /// targets are expressed in. Falls back to the decode timestamp.
    pub fn presentation_ticks(&self) -> Option<i64> {
        self.pts.or(self.dts)
    }
}
