//! The demultiplexer boundary.
//!
//! Container parsing lives outside this crate. A [`Demuxer`] hands the source its
//! stream list once, then packets one by one until it signals end of stream; the
//! source rewinds it with [`Demuxer::seek`] and [`Demuxer::flush`] when it loops.

use crate::av::Packet;
use crate::time::RationalTime;
use crate::Result;
use bytes::Bytes;
use url::Url;

pub mod memory;

pub use self::memory::{DemuxLog, MemoryDemuxer};

/// Stream metadata as reported by the demuxer.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Index carried by every packet of this stream.
    pub index: usize,
    /// Demuxer codec identifier, see [`MediaFormat::from_codec_id`](crate::av::MediaFormat::from_codec_id).
    pub codec_id: u32,
    /// Demuxer media type code, see [`MediaType::from_code`](crate::av::MediaType::from_code).
    pub media_type: i32,
    /// Duration of one timestamp tick, e.g. `1/90000`.
    pub timebase: RationalTime,
    /// First presentation timestamp in ticks, when the container knows it.
    pub start_time: Option<i64>,
    /// Codec initialization data (parameter sets, AudioSpecificConfig...).
    pub extradata: Option<Bytes>,
}

impl StreamInfo {
    pub fn new(index: usize, codec_id: u32, media_type: i32, timebase: RationalTime) -> Self {
        Self {
            index,
            codec_id,
            media_type,
            timebase,
            start_time: None,
            extradata: None,
        }
    }

    pub fn with_start_time(mut self, ticks: i64) -> Self {
        self.start_time = Some(ticks);
        self
    }

    pub fn with_extradata(mut self, extradata: impl Into<Bytes>) -> Self {
        self.extradata = Some(extradata.into());
        self
    }
}

/// Result of a successful read.
#[derive(Debug, Clone)]
pub enum ReadOutcome {
    Packet(Packet),
    EndOfStream,
}

/// Where a seek may land relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    /// Nearest keyframe at or before the target.
    Backward,
    /// Nearest keyframe at or after the target.
    Forward,
}

/// Sequential packet reader over an opened container.
#[async_trait::async_trait]
pub trait Demuxer: Send {
    /// Streams of the opened container, in demuxer order.
    fn streams(&self) -> Vec<StreamInfo>;

    /// Reads the next packet.
    ///
    /// Errors are per-packet: the caller may keep reading afterwards.
    async fn read_packet(&mut self) -> Result<ReadOutcome>;

    /// Repositions `stream_index` near `target` (in that stream's ticks).
    async fn seek(&mut self, stream_index: usize, target: i64, direction: SeekDirection) -> Result<()>;

    /// Drops any buffered partial state.
    async fn flush(&mut self) -> Result<()>;
}

/// Opens a [`Demuxer`] for a source URL.
#[async_trait::async_trait]
pub trait DemuxerOpener: Send + Sync {
    async fn open(&self, url: &Url) -> Result<Box<dyn Demuxer>>;
}

#[async_trait::async_trait]
impl<F> DemuxerOpener for F
where
    F: Fn(&Url) -> Result<Box<dyn Demuxer>> + Send + Sync,
{
    async fn open(&self, url: &Url) -> Result<Box<dyn Demuxer>> {
        self(url)
    }
}
