#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use playout::av::{CodedSample, Disposition, MediaType, Packet};
    use playout::clock::{Clock, ManualClock, TokioClock};
    use playout::error::{PlayoutError, Result};
    use playout::format::{Demuxer, MemoryDemuxer, StreamInfo};
    use playout::sink::ChannelSink;
    use playout::source::{Source, SourceOptions};
    use playout::time::RationalTime;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio::time::{timeout, Duration};
    use url::Url;

    const VIDEO_FRAMES: i64 = 30;
    const AUDIO_FRAMES: i64 = 47;
    const AUDIO_FRAME_SIZE: i64 = 1024;
    const TEST_RECEIVE_TIMEOUT: u64 = 30;

    /// One second of 30fps H.264 and 48kHz AAC, interleaved in decode order.
    fn av_clip() -> MemoryDemuxer {
        let video_tb = RationalTime::new(1, 30);
        let audio_tb = RationalTime::new(1, 48000);

        let mut packets: Vec<(RationalTime, Packet)> = Vec::new();
        for i in 0..VIDEO_FRAMES {
            let packet = Packet::new(vec![0u8; 64])
                .with_dts(i)
                .with_pts(i)
                .with_stream_index(0)
                .with_key_flag(i == 0);
            packets.push((RationalTime::from_ticks(i, video_tb), packet));
        }
        for i in 0..AUDIO_FRAMES {
            let ticks = i * AUDIO_FRAME_SIZE;
            let packet = Packet::new(vec![1u8; 16]).with_dts(ticks).with_stream_index(1);
            packets.push((RationalTime::from_ticks(ticks, audio_tb), packet));
        }
        packets.sort_by_key(|(at, _)| *at);

        MemoryDemuxer::new(vec![
            StreamInfo::new(0, 27, 0, video_tb).with_extradata(vec![0x67u8, 0x42, 0x00, 0x1f]),
            StreamInfo::new(1, 86018, 1, audio_tb).with_extradata(vec![0x11u8, 0x90]),
        ])
        .with_packets(packets.into_iter().map(|(_, packet)| packet))
    }

    fn opener(demuxer: MemoryDemuxer) -> impl Fn(&Url) -> Result<Box<dyn Demuxer>> + Send + Sync {
        move |_: &Url| -> Result<Box<dyn Demuxer>> { Ok(Box::new(demuxer.clone())) }
    }

    fn recording_sink() -> (Arc<Mutex<Vec<CodedSample>>>, impl Fn(CodedSample) -> Disposition + Send + Sync) {
        let samples = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let samples = samples.clone();
            move |sample: CodedSample| {
                samples.lock().push(sample);
                Disposition::Continue
            }
        };
        (samples, sink)
    }

    fn strictly_increasing(samples: &[CodedSample], media_type: MediaType) -> bool {
        let dts: Vec<RationalTime> = samples
            .iter()
            .filter(|s| s.media_type == media_type)
            .map(|s| s.dts)
            .collect();
        dts.windows(2).all(|w| w[1] > w[0])
    }

    #[tokio::test]
    async fn test_looping_source_keeps_monotonic_timeline() -> Result<()> {
        let clock = Arc::new(ManualClock::new());
        let (samples, sink) = recording_sink();
        let source = Source::open(
            clock.clone(),
            "memory://av-loop",
            &opener(av_clip()),
            Arc::new(sink),
            SourceOptions::new("av-loop", "workspace").with_repeats(true),
        )
        .await?;

        source.play();
        source.wait_idle().await;

        let window = RationalTime::new(2, 1);
        let step = RationalTime::from_millis(10);
        while clock.now() < RationalTime::new(10, 1) {
            let stats = source.stats();
            assert!(stats.last_read >= stats.last_sent, "{:?}", stats);
            assert!(stats.last_read - stats.last_sent < window, "{:?}", stats);

            clock.advance_by(step);
            source.wait_idle().await;
        }

        let stats = source.stats();
        println!("after 10s: {:?}", stats);
        assert!(stats.loops >= 9);
        assert!(stats.running);

        let samples = samples.lock();
        assert!(samples.len() >= 10 * (VIDEO_FRAMES + AUDIO_FRAMES) as usize);
        assert!(strictly_increasing(&samples, MediaType::Video));
        assert!(strictly_increasing(&samples, MediaType::Audio));
        assert!(samples.windows(2).all(|w| w[1].emitted_at >= w[0].emitted_at));
        for sample in samples.iter() {
            assert_eq!(sample.emitted_at, sample.dts);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_end_notification_and_replay() -> Result<()> {
        let clock = Arc::new(ManualClock::new());
        let (samples, sink) = recording_sink();
        let ends = Arc::new(Mutex::new(Vec::<(String, usize)>::new()));

        let options = {
            let ends = ends.clone();
            let samples = samples.clone();
            SourceOptions::new("clip-42", "workspace")
                .with_on_end(move |asset: &str| ends.lock().push((asset.to_string(), samples.lock().len())))
        };
        let source = Source::open(clock.clone(), "memory://clip", &opener(av_clip()), Arc::new(sink), options).await?;
        let per_pass = (VIDEO_FRAMES + AUDIO_FRAMES) as usize;

        source.play();
        source.wait_idle().await;
        clock.advance_to(RationalTime::new(5, 1));

        assert_eq!(samples.lock().len(), per_pass);
        assert_eq!(*ends.lock(), vec![("clip-42".to_string(), per_pass)]);
        assert!(!source.is_running());

        // nothing else is delivered once the source has ended
        clock.advance_to(RationalTime::new(10, 1));
        source.wait_idle().await;
        assert_eq!(samples.lock().len(), per_pass);
        assert_eq!(ends.lock().len(), 1);

        // playing again continues the output timeline
        source.play();
        source.wait_idle().await;
        clock.advance_to(RationalTime::new(15, 1));

        let samples = samples.lock();
        assert_eq!(samples.len(), 2 * per_pass);
        assert_eq!(ends.lock().len(), 2);
        assert!(strictly_increasing(&samples, MediaType::Video));
        assert!(strictly_increasing(&samples, MediaType::Audio));
        assert_eq!(samples[per_pass].emitted_at, RationalTime::new(10, 1));
        Ok(())
    }

    #[tokio::test]
    async fn test_open_propagates_demuxer_errors() {
        let failing = |url: &Url| -> Result<Box<dyn Demuxer>> {
            Err(PlayoutError::Demux(format!("cannot open {}", url)))
        };
        let (_, sink) = recording_sink();

        let result = Source::open(
            Arc::new(ManualClock::new()),
            "memory://missing",
            &failing,
            Arc::new(sink),
            SourceOptions::new("missing", "workspace"),
        )
        .await;

        match result {
            Err(PlayoutError::Demux(message)) => assert!(message.contains("memory://missing")),
            other => panic!("expected demux error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_delivers_in_real_time() -> Result<()> {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        let (sink, mut rx) = ChannelSink::channel(256);
        let (end_tx, mut end_rx) = mpsc::unbounded_channel();

        let options = SourceOptions::new("realtime", "workspace")
            .with_token("t0k3n")
            .with_on_end(move |asset: &str| {
                let _ = end_tx.send(asset.to_string());
            });
        let source = Source::open(clock.clone(), "memory://realtime", &opener(av_clip()), Arc::new(sink), options).await?;
        assert_eq!(source.streams().len(), 2);

        source.play();

        let mut received = Vec::new();
        while received.len() < (VIDEO_FRAMES + AUDIO_FRAMES) as usize {
            let sample = timeout(Duration::from_secs(TEST_RECEIVE_TIMEOUT), rx.recv())
                .await
                .expect("timed out waiting for sample")
                .expect("sink closed");
            received.push(sample);
        }

        let ended = timeout(Duration::from_secs(TEST_RECEIVE_TIMEOUT), end_rx.recv())
            .await
            .expect("timed out waiting for end of source");
        assert_eq!(ended.as_deref(), Some("realtime"));

        for sample in &received {
            assert!(sample.emitted_at >= sample.dts, "sample fired early: {:?}", sample.dts);
            assert!(sample.emitted_at - sample.dts < RationalTime::from_millis(50));
            assert_eq!(sample.token.as_deref(), Some("t0k3n"));
            assert!(sample.config().is_some());
        }
        assert!(strictly_increasing(&received, MediaType::Video));
        assert!(received[0].is_key);
        assert!(rx.try_recv().is_err());
        Ok(())
    }
}
