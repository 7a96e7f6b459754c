//! Read-ahead scheduling.
//!
//! One worker task per source reads packets, moves their timestamps onto the
//! source's output timeline and schedules each sample on the clock at
//! `epoch + (dts - start)`. Reads stop once the next sample would land a full
//! read-ahead window past the last emitted one; every emission tops the window
//! back up through [`Shared::refill`].
//!
//! The output timeline never goes backwards: on end of stream the demuxer is
//! rewound and `ts_base` moves past the highest decode time read so far, so a
//! looping source keeps counting up.

use super::emitter;
use super::streams::StreamTable;
use super::SourceOptions;
use crate::av::{CodedSample, CONFIG_KEY};
use crate::clock::Clock;
use crate::format::{Demuxer, ReadOutcome, SeekDirection};
use crate::sink::SampleSink;
use crate::time::RationalTime;
use crate::Result;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, Notify};

/// A translated sample that has not been handed to the clock yet.
pub(crate) struct Pending {
    pub(crate) sample: CodedSample,
    /// Offset from the stream start; the sample fires at `epoch + delta`.
    pub(crate) delta: RationalTime,
    /// One tick of the sample's stream timebase.
    pub(crate) tick: RationalTime,
}

/// Mutable timeline of a source. Never held across an await.
pub(crate) struct Timeline {
    pub(crate) running: bool,
    /// Decode time of the most recently scheduled sample, or the start position
    /// while parked.
    pub(crate) last_read: RationalTime,
    /// Decode time of the most recently emitted sample.
    pub(crate) last_sent: RationalTime,
    pub(crate) ts_base: RationalTime,
    pub(crate) epoch: RationalTime,
    /// Highest decode time scheduled since the last rewind, and its stream tick.
    high_water: RationalTime,
    high_water_tick: RationalTime,
    /// Lowest decode time scheduled since the last rewind, before `ts_base` is
    /// added. Below the start time when B-frames decode ahead of it.
    low_water: RationalTime,
    read_since_rewind: bool,
    /// Latest emission time scheduled in this playthrough.
    last_due: Option<RationalTime>,
    /// Samples scheduled in the current generation and not yet fired.
    pub(crate) outstanding: u64,
    /// A sample read past the window, held until the window opens.
    stash: Option<Pending>,
    /// Bumped by `reset`; samples of older generations are not delivered.
    pub(crate) generation: u64,
    pub(crate) end_armed: bool,
}

impl Timeline {
    fn new(start: RationalTime) -> Self {
        Self {
            running: false,
            last_read: start,
            last_sent: start,
            ts_base: RationalTime::ZERO,
            epoch: RationalTime::ZERO,
            high_water: start,
            high_water_tick: RationalTime::ZERO,
            low_water: start,
            read_since_rewind: false,
            last_due: None,
            outstanding: 0,
            stash: None,
            generation: 0,
            end_armed: false,
        }
    }

    /// Moves `last_read` to the start of the next playthrough so that `play`
    /// makes it due immediately.
    fn park(&mut self, start: RationalTime) {
        self.last_read = self.ts_base + start;
    }

    /// Whether the next sample may be scheduled now.
    ///
    /// With nothing outstanding a sample is always admitted, otherwise a sparse
    /// track whose packets are further apart than the window would never emit.
    fn has_room(&self, window: RationalTime) -> bool {
        if !self.running {
            return false;
        }
        match &self.stash {
            Some(pending) => self.outstanding == 0 || pending.sample.dts - self.last_sent < window,
            None => self.last_read - self.last_sent < window,
        }
    }
}

#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) scheduled: AtomicU64,
    pub(crate) emitted: AtomicU64,
    pub(crate) loops: AtomicU64,
    pub(crate) fill_passes: AtomicU64,
    pub(crate) refills_skipped: AtomicU64,
    pub(crate) read_failures: AtomicU64,
}

enum ReadStep {
    Scheduled,
    /// Read, but held back until the window opens.
    Deferred,
    /// Packet of a stream that is not in the table.
    Discarded,
    EndOfStream,
}

/// State shared between a [`Source`](super::Source), its worker task and the
/// callbacks it leaves on the clock (which only hold a `Weak`).
pub(crate) struct Shared {
    pub(crate) options: SourceOptions,
    pub(crate) table: StreamTable,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) sink: Arc<dyn SampleSink>,
    demuxer: AsyncMutex<Box<dyn Demuxer>>,
    pub(crate) filling: AtomicBool,
    alive: AtomicBool,
    wake: Notify,
    idle: Notify,
    pub(crate) timeline: Mutex<Timeline>,
    pub(crate) counters: Counters,
    window: RationalTime,
}

impl Shared {
    pub(crate) fn new(
        options: SourceOptions,
        table: StreamTable,
        demuxer: Box<dyn Demuxer>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn SampleSink>,
    ) -> Self {
        let window = RationalTime::from_duration(options.read_ahead);
        let timeline = Timeline::new(table.earliest_start());
        Self {
            options,
            table,
            clock,
            sink,
            demuxer: AsyncMutex::new(demuxer),
            filling: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            wake: Notify::new(),
            idle: Notify::new(),
            timeline: Mutex::new(timeline),
            counters: Counters::default(),
            window,
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Invalidates the source: queued callbacks become no-ops, the worker exits.
    pub(crate) fn close(&self) {
        self.alive.store(false, Ordering::Release);
        self.wake.notify_one();
        self.idle.notify_waiters();
    }

    /// Starts (or resumes) playback, re-anchoring the epoch so that the next
    /// sample to read is due now.
    pub(crate) fn play(&self) {
        {
            let mut tl = self.timeline.lock();
            if tl.running {
                debug!("{}: play while running, topping up only", self.options.asset_id);
            } else {
                tl.running = true;
                tl.end_armed = true;
                if tl.outstanding == 0 {
                    tl.last_sent = tl.last_read;
                }
                // While parked last_read sits at ts_base + earliest start, which
                // makes this `now - ts_base`.
                let position = tl.last_read - self.table.earliest_start();
                tl.epoch = self.clock.now() - position;
                info!(
                    "{}: playing, ts_base={} epoch={}",
                    self.options.asset_id, tl.ts_base, tl.epoch
                );
            }
        }
        self.refill();
    }

    /// Clears `running`; samples already on the clock still fire.
    pub(crate) fn stop(&self) {
        self.timeline.lock().running = false;
    }

    /// Rewinds to the start and stops. Samples still on the clock are dropped.
    pub(crate) async fn reset(&self) {
        let mut demuxer = self.demuxer.lock().await;
        self.rewind(demuxer.as_mut()).await;

        let mut tl = self.timeline.lock();
        tl.running = false;
        tl.park(self.table.earliest_start());
        tl.generation += 1;
        tl.outstanding = 0;
        tl.last_due = None;
        tl.last_sent = tl.last_read;
        info!("{}: reset, ts_base={}", self.options.asset_id, tl.ts_base);
    }

    /// Asks the worker for a fill pass. A no-op returning `false` while a pass
    /// is already in flight.
    pub(crate) fn refill(&self) -> bool {
        if self
            .filling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.counters.refills_skipped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.wake.notify_one();
        true
    }

    /// Resolves once no fill pass is in flight.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if !self.filling.load(Ordering::Acquire) || !self.is_alive() {
                return;
            }
            idle.await;
        }
    }

    /// Worker loop: one fill pass per wake-up.
    pub(crate) async fn run(self: Arc<Self>) {
        loop {
            self.wake.notified().await;
            if !self.is_alive() {
                break;
            }
            self.fill().await;
        }
        debug!("{}: worker exiting", self.options.asset_id);
    }

    async fn fill(self: &Arc<Self>) {
        loop {
            self.counters.fill_passes.fetch_add(1, Ordering::Relaxed);
            self.fill_pass().await;
            self.filling.store(false, Ordering::Release);

            // An emission may have landed between the last window check and
            // clearing the flag; its refill was skipped, so look again.
            let room = self.timeline.lock().has_room(self.window);
            if !room
                || !self.is_alive()
                || self
                    .filling
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
            {
                break;
            }
        }
        self.idle.notify_waiters();
    }

    async fn fill_pass(self: &Arc<Self>) {
        let mut demuxer = self.demuxer.lock().await;
        let mut failures = 0u32;
        let mut backoff = self.options.failure_backoff;

        while self.is_alive() {
            let stashed = {
                let mut tl = self.timeline.lock();
                if !tl.has_room(self.window) {
                    return;
                }
                tl.stash.take()
            };
            if let Some(pending) = stashed {
                self.commit(pending);
                continue;
            }

            match self.read_one(demuxer.as_mut()).await {
                Ok(ReadStep::Scheduled) | Ok(ReadStep::Deferred) | Ok(ReadStep::Discarded) => {
                    failures = 0;
                    backoff = self.options.failure_backoff;
                }
                Ok(ReadStep::EndOfStream) => {
                    failures = 0;
                    self.end_of_stream(demuxer.as_mut()).await;
                }
                Err(err) => {
                    failures += 1;
                    self.counters.read_failures.fetch_add(1, Ordering::Relaxed);
                    if err.is_transient() {
                        warn!("{}: read failed: {}", self.options.asset_id, err);
                    } else {
                        error!("{}: read failed: {}", self.options.asset_id, err);
                    }

                    if failures >= self.options.max_read_failures {
                        warn!(
                            "{}: {} consecutive read failures, backing off {:?}",
                            self.options.asset_id, failures, backoff
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(self.options.max_failure_backoff);
                        failures = 0;
                    }
                }
            }
        }
    }

    /// Reads one packet and schedules (or stashes) its sample.
    async fn read_one(self: &Arc<Self>, demuxer: &mut dyn Demuxer) -> Result<ReadStep> {
        let packet = match demuxer.read_packet().await? {
            ReadOutcome::Packet(packet) => packet,
            ReadOutcome::EndOfStream => return Ok(ReadStep::EndOfStream),
        };

        let Some(stream) = self.table.get(packet.stream_index) else {
            debug!(
                "{}: discarding packet of untracked stream {}",
                self.options.asset_id, packet.stream_index
            );
            return Ok(ReadStep::Discarded);
        };

        let (pts, dts) = stream.translate(&packet);
        let mut tl = self.timeline.lock();
        let pts = tl.ts_base + pts;
        let dts = tl.ts_base + dts;

        let side_data = stream.extradata.as_ref().map(|config| {
            let mut side = HashMap::new();
            side.insert(CONFIG_KEY.to_string(), config.clone());
            side
        });

        let pending = Pending {
            sample: CodedSample {
                asset_id: self.options.asset_id.clone(),
                workspace_id: self.options.workspace_id.clone(),
                emitted_at: RationalTime::ZERO,
                pts,
                dts,
                media_type: stream.media_type,
                media_format: stream.media_format,
                data: packet.data,
                side_data,
                token: self.options.workspace_token.clone(),
                event: self.options.event.clone(),
                stream_index: packet.stream_index,
                is_key: packet.is_key,
            },
            delta: dts - stream.start_time,
            tick: stream.timebase,
        };

        if tl.outstanding > 0 && dts - tl.last_sent >= self.window {
            tl.stash = Some(pending);
            return Ok(ReadStep::Deferred);
        }
        drop(tl);

        self.commit(pending);
        Ok(ReadStep::Scheduled)
    }

    /// Hands a sample to the clock.
    fn commit(self: &Arc<Self>, pending: Pending) {
        let (at, generation) = {
            let mut tl = self.timeline.lock();
            let dts = pending.sample.dts;
            tl.last_read = dts;
            if !tl.read_since_rewind || dts >= tl.high_water {
                tl.high_water = dts;
                tl.high_water_tick = pending.tick;
            }
            let local = dts - tl.ts_base;
            if !tl.read_since_rewind || local < tl.low_water {
                tl.low_water = local;
            }
            tl.read_since_rewind = true;
            tl.outstanding += 1;

            let at = tl.epoch + pending.delta;
            tl.last_due = Some(tl.last_due.map_or(at, |due| due.max(at)));
            (at, tl.generation)
        };

        self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        emitter::schedule_sample(self, at, pending.sample, generation);
    }

    async fn end_of_stream(self: &Arc<Self>, demuxer: &mut dyn Demuxer) {
        let produced = self.timeline.lock().read_since_rewind;
        self.rewind(demuxer).await;

        let mut tl = self.timeline.lock();
        if self.options.repeats && produced {
            // The epoch is kept: the next pass is scheduled straight after the
            // tail of this one instead of on top of it.
            self.counters.loops.fetch_add(1, Ordering::Relaxed);
            info!("{}: looping, ts_base={}", self.options.asset_id, tl.ts_base);
            return;
        }

        if self.options.repeats {
            warn!(
                "{}: a full pass produced no samples, not looping",
                self.options.asset_id
            );
        }
        tl.running = false;
        tl.park(self.table.earliest_start());
        let due = tl.last_due.take().unwrap_or_else(|| self.clock.now());
        let generation = tl.generation;
        drop(tl);

        info!("{}: end of source", self.options.asset_id);
        emitter::schedule_end(self, due, generation);
    }

    /// Flushes the demuxer, advances `ts_base` past everything read and seeks
    /// every stream back to its start. Flush and seek failures are logged only.
    ///
    /// `last_read` is left alone so a looping source stays inside its window;
    /// callers that stop playback park it with `Timeline::park`.
    async fn rewind(&self, demuxer: &mut dyn Demuxer) {
        if let Err(err) = demuxer.flush().await {
            warn!("{}: flush failed: {}", self.options.asset_id, err);
        }

        {
            let start = self.table.earliest_start();
            let mut tl = self.timeline.lock();
            if tl.read_since_rewind {
                // The next pass starts at whichever comes first: the start time
                // or the earliest decode time seen, one tick past this pass.
                let first = tl.low_water.min(start);
                tl.ts_base = tl.high_water + tl.high_water_tick - first;
            }
            tl.read_since_rewind = false;
            tl.stash = None;
        }

        for stream in self.table.iter() {
            if let Err(err) = demuxer
                .seek(stream.index, stream.start_ticks, SeekDirection::Backward)
                .await
            {
                warn!(
                    "{}: seek to start failed on stream {}: {}",
                    self.options.asset_id, stream.index, err
                );
            }
        }
    }

    /// Delivers a fired sample. Samples of a closed source or an older
    /// generation are dropped silently.
    pub(crate) fn deliver(&self, mut sample: CodedSample, fired_at: RationalTime, generation: u64) {
        if !self.is_alive() {
            return;
        }
        {
            let mut tl = self.timeline.lock();
            if tl.generation != generation {
                return;
            }
            tl.outstanding = tl.outstanding.saturating_sub(1);
            tl.last_sent = sample.dts;
        }

        sample.emitted_at = fired_at;
        let disposition = self.sink.emit(sample);
        self.counters.emitted.fetch_add(1, Ordering::Relaxed);

        if disposition.wants_more() {
            self.refill();
        } else {
            debug!("{}: consumer returned {:?}, skipping refill", self.options.asset_id, disposition);
        }
    }

    /// Runs the end-of-source callback once per playthrough.
    pub(crate) fn notify_end(&self, generation: u64) {
        if !self.is_alive() {
            return;
        }
        let fire = {
            let mut tl = self.timeline.lock();
            let fire = tl.generation == generation && tl.end_armed && !tl.running;
            if fire {
                tl.end_armed = false;
            }
            fire
        };

        if fire {
            if let Some(on_end) = &self.options.on_end {
                on_end(&self.options.asset_id);
            }
        }
    }
}
