//! # Timed Sources
//!
//! A [`Source`] turns the packets of one demuxed asset into [`CodedSample`]s
//! delivered to a [`SampleSink`] at the right clock time.
//!
//! ```rust,no_run
//! use playout::clock::{Clock, TokioClock};
//! use playout::format::{Demuxer, MemoryDemuxer};
//! use playout::sink::ChannelSink;
//! use playout::source::{Source, SourceOptions};
//! use std::sync::Arc;
//! use url::Url;
//!
//! # async fn run(demuxer: MemoryDemuxer) -> playout::Result<()> {
//! let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
//! let (sink, mut samples) = ChannelSink::channel(64);
//! let opener = move |_: &Url| -> playout::Result<Box<dyn Demuxer>> { Ok(Box::new(demuxer.clone())) };
//!
//! let source = Source::open(
//!     clock,
//!     "file:///media/clip.mp4",
//!     &opener,
//!     Arc::new(sink),
//!     SourceOptions::new("clip", "workspace").with_repeats(true),
//! )
//! .await?;
//! source.play();
//!
//! while let Some(sample) = samples.recv().await {
//!     println!("{:?} dts={}", sample.media_format, sample.dts);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`CodedSample`]: crate::av::CodedSample

mod emitter;
mod scheduler;
mod streams;


pub use streams::{StreamDescriptor, StreamTable};

use crate::av::MediaFormat;
use crate::clock::Clock;
use crate::config;
use crate::format::DemuxerOpener;
use crate::sink::SampleSink;
use crate::time::RationalTime;
use crate::Result;
use log::info;
use scheduler::Shared;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

/// Called with the asset id once a non-repeating source has delivered its last sample.
pub type EndCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Identity and tuning of a source.
#[derive(Clone)]
pub struct SourceOptions {
    pub asset_id: String,
    pub workspace_id: String,
    /// Attached to every sample as its auth token.
    pub workspace_token: Option<String>,
    /// Loop back to the start at end of stream.
    pub repeats: bool,
    pub on_end: Option<EndCallback>,
    /// Attached to every sample as its event metadata.
    pub event: Option<HashMap<String, String>>,
    pub read_ahead: Duration,
    pub max_read_failures: u32,
    pub failure_backoff: Duration,
    pub max_failure_backoff: Duration,
}

impl SourceOptions {
    /// Creates options with tuning taken from the process [`config`].
    pub fn new(asset_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        let config = config::get();
        Self {
            asset_id: asset_id.into(),
            workspace_id: workspace_id.into(),
            workspace_token: None,
            repeats: false,
            on_end: None,
            event: None,
            read_ahead: config.read_ahead,
            max_read_failures: config.max_read_failures,
            failure_backoff: config.failure_backoff,
            max_failure_backoff: config.max_failure_backoff,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.workspace_token = Some(token.into());
        self
    }

    pub fn with_repeats(mut self, repeats: bool) -> Self {
        self.repeats = repeats;
        self
    }

    pub fn with_on_end(mut self, on_end: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_end = Some(Arc::new(on_end));
        self
    }

    pub fn with_event(mut self, event: HashMap<String, String>) -> Self {
        self.event = Some(event);
        self
    }

    /// Sets the read-ahead window. Zero is raised to one millisecond.
    pub fn with_read_ahead(mut self, read_ahead: Duration) -> Self {
        self.read_ahead = read_ahead.max(Duration::from_millis(1));
        self
    }

    /// Sets the transient read failure policy.
    pub fn with_retry(mut self, max_read_failures: u32, backoff: Duration, max_backoff: Duration) -> Self {
        self.max_read_failures = max_read_failures.max(1);
        self.failure_backoff = backoff;
        self.max_failure_backoff = max_backoff.max(backoff);
        self
    }
}

impl fmt::Debug for SourceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceOptions")
            .field("asset_id", &self.asset_id)
            .field("workspace_id", &self.workspace_id)
            .field("workspace_token", &self.workspace_token.as_ref().map(|_| "<redacted>"))
            .field("repeats", &self.repeats)
            .field("on_end", &self.on_end.is_some())
            .field("event", &self.event)
            .field("read_ahead", &self.read_ahead)
            .field("max_read_failures", &self.max_read_failures)
            .field("failure_backoff", &self.failure_backoff)
            .field("max_failure_backoff", &self.max_failure_backoff)
            .finish()
    }
}

/// Point-in-time view of a source's scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceStats {
    pub running: bool,
    pub filling: bool,
    pub last_read: RationalTime,
    pub last_sent: RationalTime,
    pub ts_base: RationalTime,
    pub epoch: RationalTime,
    /// Samples handed to the clock and not yet delivered.
    pub outstanding: u64,
    pub scheduled: u64,
    pub emitted: u64,
    pub loops: u64,
    pub fill_passes: u64,
    pub refills_skipped: u64,
    pub read_failures: u64,
}

/// A playing (or playable) asset.
///
/// Dropping the source stops its worker; samples still queued on the clock are
/// then discarded when they fire.
pub struct Source {
    shared: Arc<Shared>,
    worker: JoinHandle<()>,
}

impl Source {
    /// Opens `url` through `opener` and prepares the track table.
    ///
    /// Fails with [`PlayoutError::Unsupported`](crate::PlayoutError::Unsupported)
    /// when no stream has a supported codec and media type; no worker is
    /// started in that case.
    pub async fn open(
        clock: Arc<dyn Clock>,
        url: &str,
        opener: &dyn DemuxerOpener,
        sink: Arc<dyn SampleSink>,
        options: SourceOptions,
    ) -> Result<Source> {
        let url = parse_source_url(url)?;
        let demuxer = opener.open(&url).await?;
        let table = StreamTable::build(&demuxer.streams())?;

        info!(
            "{}: opened {} with {} track(s) {:?}",
            options.asset_id,
            url,
            table.len(),
            table.formats()
        );

        let shared = Arc::new(Shared::new(options, table, demuxer, clock, sink));
        let worker = tokio::spawn(shared.clone().run());
        Ok(Source { shared, worker })
    }

    pub fn asset_id(&self) -> &str {
        &self.shared.options.asset_id
    }

    /// One format per retained track.
    pub fn formats(&self) -> BTreeSet<MediaFormat> {
        self.shared.table.formats()
    }

    pub fn streams(&self) -> &[StreamDescriptor] {
        self.shared.table.as_slice()
    }

    /// Starts playback from the current position, due now.
    pub fn play(&self) {
        self.shared.play()
    }

    /// Stops reading. Samples already scheduled are still delivered.
    pub fn stop(&self) {
        self.shared.stop()
    }

    /// Rewinds to the start and stops; scheduled samples are discarded.
    /// The output timeline keeps counting up across resets.
    pub async fn reset(&self) {
        self.shared.reset().await
    }

    /// Requests a read-ahead top-up. Returns `false` (and does nothing) if a
    /// fill pass is already in flight.
    pub fn refill(&self) -> bool {
        self.shared.refill()
    }

    pub fn is_running(&self) -> bool {
        self.shared.timeline.lock().running
    }

    /// Resolves once the worker has no fill pass in flight.
    pub async fn wait_idle(&self) {
        self.shared.wait_idle().await
    }

    pub fn stats(&self) -> SourceStats {
        let counters = &self.shared.counters;
        let tl = self.shared.timeline.lock();
        SourceStats {
            running: tl.running,
            filling: self.shared.filling.load(Ordering::Acquire),
            last_read: tl.last_read,
            last_sent: tl.last_sent,
            ts_base: tl.ts_base,
            epoch: tl.epoch,
            outstanding: tl.outstanding,
            scheduled: counters.scheduled.load(Ordering::Relaxed),
            emitted: counters.emitted.load(Ordering::Relaxed),
            loops: counters.loops.load(Ordering::Relaxed),
            fill_passes: counters.fill_passes.load(Ordering::Relaxed),
            refills_skipped: counters.refills_skipped.load(Ordering::Relaxed),
            read_failures: counters.read_failures.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("options", &self.shared.options)
            .field("streams", &self.shared.table)
            .finish()
    }
}

impl Drop for Source {
    fn drop(&mut self) {
        self.shared.close();
        self.worker.abort();
    }
}

/// Accepts absolute URLs as well as plain filesystem paths.
fn parse_source_url(input: &str) -> Result<Url> {
    match Url::parse(input) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let path = std::env::current_dir()?.join(input);
            Url::from_file_path(&path).map_err(|_| {
                crate::PlayoutError::Unsupported(format!("not a usable path: {}", path.display()))
            })
        }
        Err(err) => Err(err.into()),
    }
}
