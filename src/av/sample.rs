use super::{MediaFormat, MediaType};
use crate::time::RationalTime;
use bytes::Bytes;
use std::collections::HashMap;

/// Side-channel key under which a track's codec configuration travels.
pub const CONFIG_KEY: &str = "config";

/// A timed, still-compressed sample handed to the consumer at its emission time.
#[derive(Debug, Clone)]
pub struct CodedSample {
    pub asset_id: String,
    pub workspace_id: String,
    /// Clock time at which the sample was delivered.
    pub emitted_at: RationalTime,
    /// Presentation time on the source's output timeline.
    pub pts: RationalTime,
    /// Decode time on the source's output timeline.
    pub dts: RationalTime,
    pub media_type: MediaType,
    pub media_format: MediaFormat,
    pub data: Bytes,
    /// Out-of-band data, e.g. [`CONFIG_KEY`] → codec parameter sets.
    pub side_data: Option<HashMap<String, Bytes>>,
    pub token: Option<String>,
    pub event: Option<HashMap<String, String>>,
    pub stream_index: usize,
    pub is_key: bool,
}

impl CodedSample {
    /// The codec configuration bytes carried alongside this sample, if any.
    pub fn config(&self) -> Option<&Bytes> {
        self.side_data.as_ref().and_then(|side| side.get(CONFIG_KEY))
    }
}

/// What the consumer reports back after taking a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Sample accepted, keep delivering.
    Continue,
    /// Consumer had nothing to do with the sample.
    Empty,
    /// Consumer failed on this sample but can take more.
    Error,
    /// Consumer wants no more deliveries; the next read-ahead is skipped.
    Terminal,
}

impl Disposition {
    /// Whether the scheduler should keep topping up its read-ahead.
    pub fn wants_more(&self) -> bool {
        !matches!(self, Disposition::Terminal)
    }
}
