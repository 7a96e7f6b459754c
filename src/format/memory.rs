//! In-memory scripted demuxer.
//!
//! Plays back a fixed list of read steps (packets, per-packet failures) and then
//! reports end of stream. Seeks rewind the script, so a source configured to
//! repeat loops over it forever. Every call is recorded in a shared [`DemuxLog`]
//! that outlives the demuxer once it has been handed to a source.

use super::{Demuxer, ReadOutcome, SeekDirection, StreamInfo};
use crate::av::Packet;
use crate::{PlayoutError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// One scripted read.
#[derive(Debug, Clone)]
pub enum Step {
    Packet(Packet),
    /// Demuxer-level failure on a single read.
    Fail(String),
    /// A packet whose payload could not be obtained.
    MissingPayload(usize),
}

/// Calls observed by a [`MemoryDemuxer`].
#[derive(Debug, Clone, Default)]
pub struct DemuxLog {
    pub reads: usize,
    pub end_of_streams: usize,
    pub flushes: usize,
    pub seeks: Vec<(usize, i64, SeekDirection)>,
}

#[derive(Debug, Clone)]
pub struct MemoryDemuxer {
    streams: Vec<StreamInfo>,
    steps: Vec<Step>,
    cursor: usize,
    /// Set between a seek and the next read so that seeking several streams
    /// lands on the earliest of their positions.
    seeking: bool,
    failing_seek: Option<usize>,
    log: Arc<Mutex<DemuxLog>>,
}

impl MemoryDemuxer {
    pub fn new(streams: Vec<StreamInfo>) -> Self {
        Self {
            streams,
            steps: Vec::new(),
            cursor: 0,
            seeking: false,
            failing_seek: None,
            log: Arc::new(Mutex::new(DemuxLog::default())),
        }
    }

    pub fn with_packet(mut self, packet: Packet) -> Self {
        self.steps.push(Step::Packet(packet));
        self
    }

    pub fn with_packets(mut self, packets: impl IntoIterator<Item = Packet>) -> Self {
        self.steps.extend(packets.into_iter().map(Step::Packet));
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Makes every seek on `stream_index` fail.
    pub fn with_failing_seek(mut self, stream_index: usize) -> Self {
        self.failing_seek = Some(stream_index);
        self
    }

    /// Shared handle on the call log.
    pub fn log(&self) -> Arc<Mutex<DemuxLog>> {
        self.log.clone()
    }

    /// Script position a seek on `stream_index` lands on. Targets are
    /// presentation times, so a leading packet decoded before the target is
    /// still reached by a backward seek.
    fn seek_position(&self, stream_index: usize, target: i64, direction: SeekDirection) -> usize {
        let candidates = self.steps.iter().enumerate().filter_map(|(i, step)| match step {
            Step::Packet(p) if p.stream_index == stream_index => {
                Some((i, p.presentation_ticks().unwrap_or(0)))
            }
            _ => None,
        });

        match direction {
            SeekDirection::Backward => candidates
                .filter(|(_, ts)| *ts <= target)
                .map(|(i, _)| i)
                .last()
                .unwrap_or(0),
            SeekDirection::Forward => candidates
                .filter(|(_, ts)| *ts >= target)
                .map(|(i, _)| i)
                .next()
                .unwrap_or(self.steps.len()),
        }
    }
}

#[async_trait::async_trait]
impl Demuxer for MemoryDemuxer {
    fn streams(&self) -> Vec<StreamInfo> {
        self.streams.clone()
    }

    async fn read_packet(&mut self) -> Result<ReadOutcome> {
        self.seeking = false;
        let mut log = self.log.lock();
        log.reads += 1;

        let Some(step) = self.steps.get(self.cursor) else {
            log.end_of_streams += 1;
            return Ok(ReadOutcome::EndOfStream);
        };
        self.cursor += 1;

        match step {
            Step::Packet(packet) => Ok(ReadOutcome::Packet(packet.clone())),
            Step::Fail(reason) => Err(PlayoutError::Demux(reason.clone())),
            Step::MissingPayload(stream_index) => Err(PlayoutError::PayloadUnavailable {
                stream_index: *stream_index,
            }),
        }
    }

    async fn seek(&mut self, stream_index: usize, target: i64, direction: SeekDirection) -> Result<()> {
        self.log.lock().seeks.push((stream_index, target, direction));

        if self.failing_seek == Some(stream_index) {
            return Err(PlayoutError::Seek {
                stream_index,
                reason: "seek not supported".into(),
            });
        }

        let position = self.seek_position(stream_index, target, direction);
        self.cursor = if self.seeking {
            self.cursor.min(position)
        } else {
            position
        };
        self.seeking = true;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.log.lock().flushes += 1;
        Ok(())
    }
}
