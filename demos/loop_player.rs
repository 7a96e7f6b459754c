use playout::av::{MediaType, Packet};
use playout::clock::{Clock, TokioClock};
use playout::format::{Demuxer, MemoryDemuxer, StreamInfo};
use playout::sink::ChannelSink;
use playout::source::{Source, SourceOptions};
use playout::time::RationalTime;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

/// Two seconds of 25fps video with 20ms audio frames in a 90kHz timebase.
fn synthetic_clip() -> MemoryDemuxer {
    let mut packets = Vec::new();
    for i in 0..100i64 {
        let ticks = i * 1800;
        if i % 2 == 0 {
            packets.push(
                Packet::new(vec![0u8; 1200])
                    .with_dts(ticks)
                    .with_pts(ticks + 3600)
                    .with_stream_index(0)
                    .with_key_flag(i % 50 == 0),
            );
        }
        packets.push(Packet::new(vec![0u8; 160]).with_dts(ticks).with_stream_index(1));
    }

    let tb = RationalTime::new(1, 90000);
    MemoryDemuxer::new(vec![
        StreamInfo::new(0, 27, 0, tb).with_start_time(0),
        StreamInfo::new(1, 86018, 1, tb),
    ])
    .with_packets(packets)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let seconds: u64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(10);

    let clip = synthetic_clip();
    let opener = move |_: &Url| -> playout::Result<Box<dyn Demuxer>> { Ok(Box::new(clip.clone())) };

    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let (sink, mut rx) = ChannelSink::channel(256);

    let options = SourceOptions::new("synthetic", "demo")
        .with_repeats(true)
        .with_on_end(|asset: &str| println!("{} ended", asset));

    println!("Opening synthetic clip");
    let source = Source::open(clock.clone(), "memory://synthetic", &opener, Arc::new(sink), options).await?;
    for stream in source.streams() {
        println!(
            "  stream {}: {:?} ({:?}), timebase {:?}",
            stream.index, stream.media_format, stream.media_type, stream.timebase
        );
    }

    // Print samples as they come due
    tokio::spawn(async move {
        let mut video = 0u64;
        let mut audio = 0u64;
        while let Some(sample) = rx.recv().await {
            match sample.media_type {
                MediaType::Video => video += 1,
                MediaType::Audio => audio += 1,
                _ => {}
            }
            if sample.is_key {
                println!(
                    "keyframe dts={} emitted_at={} (video: {}, audio: {})",
                    sample.dts, sample.emitted_at, video, audio
                );
            }
        }
    });

    println!("Starting playback");
    source.play();

    sleep(Duration::from_secs(seconds)).await;
    let stats = source.stats();
    println!("Statistics after {} seconds:", seconds);
    println!("  Emitted samples: {}", stats.emitted);
    println!("  Loops: {}", stats.loops);
    println!("  Output timeline at {}", stats.last_sent);

    source.stop();
    println!("Done");
    Ok(())
}
