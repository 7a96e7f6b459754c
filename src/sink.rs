//! Downstream consumers of emitted samples.

use crate::av::{CodedSample, Disposition};
use log::debug;
use tokio::sync::mpsc;

/// Receives samples at their emission time.
///
/// `emit` runs on the clock's dispatch context and should return promptly.
pub trait SampleSink: Send + Sync {
    fn emit(&self, sample: CodedSample) -> Disposition;
}

impl<F> SampleSink for F
where
    F: Fn(CodedSample) -> Disposition + Send + Sync,
{
    fn emit(&self, sample: CodedSample) -> Disposition {
        self(sample)
    }
}

/// Forwards samples into a bounded tokio channel.
///
/// A full channel drops the sample and reports [`Disposition::Error`]; a closed
/// one reports [`Disposition::Terminal`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<CodedSample>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<CodedSample>) -> Self {
        Self { tx }
    }

    /// Creates a sink and the receiver it feeds.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CodedSample>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl SampleSink for ChannelSink {
    fn emit(&self, sample: CodedSample) -> Disposition {
        match self.tx.try_send(sample) {
            Ok(()) => Disposition::Continue,
            Err(mpsc::error::TrySendError::Full(sample)) => {
                debug!("sink full, dropping sample dts={}", sample.dts);
                Disposition::Error
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Disposition::Terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::{MediaFormat, MediaType};
    use crate::time::RationalTime;
    use bytes::Bytes;

    fn sample(n: i64) -> CodedSample {
        CodedSample {
            asset_id: "asset".into(),
            workspace_id: "ws".into(),
            emitted_at: RationalTime::ZERO,
            pts: RationalTime::new(n, 30),
            dts: RationalTime::new(n, 30),
            media_type: MediaType::Video,
            media_format: MediaFormat::H264,
            data: Bytes::from_static(&[0, 0, 1]),
            side_data: None,
            token: None,
            event: None,
            stream_index: 0,
            is_key: false,
        }
    }

    #[tokio::test]
    async fn test_channel_sink_dispositions() {
        let (sink, mut rx) = ChannelSink::channel(1);

        assert_eq!(sink.emit(sample(0)), Disposition::Continue);
        assert_eq!(sink.emit(sample(1)), Disposition::Error);
        assert_eq!(rx.recv().await.map(|s| s.dts), Some(RationalTime::new(0, 30)));

        drop(rx);
        assert_eq!(sink.emit(sample(2)), Disposition::Terminal);
    }

    #[test]
    fn test_closure_sink() {
        let sink = |s: CodedSample| {
            if s.dts > RationalTime::new(1, 30) {
                Disposition::Terminal
            } else {
                Disposition::Continue
            }
        };
        assert!(sink.emit(sample(1)).wants_more());
        assert!(!sink.emit(sample(2)).wants_more());
    }
}
