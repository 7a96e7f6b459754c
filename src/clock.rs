//! # Clocks
//!
//! A [`Clock`] tells the current monotonic time and runs callbacks at a requested
//! time. Sources never sleep on their own; every emission is a callback scheduled
//! on the clock they were opened with.
//!
//! - [`TokioClock`] follows the tokio timer, firing callbacks from a single
//!   dispatcher task in time order.
//! - [`ManualClock`] only moves when told to, which makes playback deterministic
//!   in tests and offline simulations.

use crate::time::RationalTime;
use log::debug;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

/// Callback run by a clock; receives the time it was fired at.
pub type ClockCallback = Box<dyn FnOnce(RationalTime) + Send + 'static>;

/// Shared time source and timer facility.
pub trait Clock: Send + Sync {
    /// Current monotonic time.
    fn now(&self) -> RationalTime;

    /// Runs `callback` once `now()` reaches `at`. Times already in the past fire
    /// as soon as possible. Callbacks due at the same time fire in the order they
    /// were scheduled.
    fn schedule_at(&self, at: RationalTime, callback: ClockCallback);
}

struct Timer {
    at: RationalTime,
    seq: u64,
    callback: ClockCallback,
}

/// Real-time clock on top of the tokio timer.
///
/// Time zero is the moment the clock was created; `now()` has microsecond scale.
pub struct TokioClock {
    start: Instant,
    seq: AtomicU64,
    timers: mpsc::UnboundedSender<Timer>,
}

impl TokioClock {
    /// Creates the clock and spawns its dispatcher on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new() -> Self {
        let start = Instant::now();
        let (timers, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(start, rx));
        Self {
            start,
            seq: AtomicU64::new(0),
            timers,
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> RationalTime {
        RationalTime::from_duration(self.start.elapsed())
    }

    fn schedule_at(&self, at: RationalTime, callback: ClockCallback) {
        let timer = Timer {
            at,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            callback,
        };
        if self.timers.send(timer).is_err() {
            debug!("clock dispatcher gone, dropping timer at {}", at);
        }
    }
}

async fn dispatch(start: Instant, mut rx: mpsc::UnboundedReceiver<Timer>) {
    let mut pending: BTreeMap<(RationalTime, u64), ClockCallback> = BTreeMap::new();
    let deadline_of = |at: RationalTime| start + at.to_duration().unwrap_or_default();

    loop {
        let next = pending.keys().next().map(|(at, _)| deadline_of(*at));

        tokio::select! {
            timer = rx.recv() => match timer {
                Some(timer) => {
                    pending.insert((timer.at, timer.seq), timer.callback);
                }
                None => break,
            },
            _ = sleep_until(next.unwrap_or_else(Instant::now)), if next.is_some() => {
                // Deadlines are compared as instants: `now()` is truncated to
                // microseconds and may sit just below a 1/30 boundary.
                let fired = Instant::now();
                while let Some(at) = pending
                    .keys()
                    .next()
                    .map(|(at, _)| *at)
                    .filter(|at| deadline_of(*at) <= fired)
                {
                    if let Some((_, callback)) = pending.pop_first() {
                        callback(at.max(RationalTime::from_duration(fired - start)));
                    }
                }
            }
        }
    }
}

/// A clock that only advances when told to.
pub struct ManualClock {
    state: Mutex<ManualState>,
}

struct ManualState {
    now: RationalTime,
    seq: u64,
    pending: BTreeMap<(RationalTime, u64), ClockCallback>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(RationalTime::ZERO)
    }

    pub fn starting_at(now: RationalTime) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now,
                seq: 0,
                pending: BTreeMap::new(),
            }),
        }
    }

    /// Moves the clock to `to`, firing every callback due on the way in time
    /// order. While a callback runs, `now()` is its scheduled time (or the
    /// current time, for timers scheduled in the past).
    /// Callbacks run without the clock locked and may schedule further timers.
    ///
    /// Returns the number of callbacks fired.
    pub fn advance_to(&self, to: RationalTime) -> usize {
        let mut fired = 0;
        loop {
            let due = {
                let mut state = self.state.lock();
                let next = state.pending.keys().next().map(|(at, _)| *at);
                match next {
                    Some(at) if at <= to => {
                        if at > state.now {
                            state.now = at;
                        }
                        let now = state.now;
                        state.pending.pop_first().map(|(_, callback)| (now, callback))
                    }
                    _ => {
                        if to > state.now {
                            state.now = to;
                        }
                        None
                    }
                }
            };

            match due {
                Some((at, callback)) => {
                    callback(at);
                    fired += 1;
                }
                None => return fired,
            }
        }
    }

    /// Advances the clock by `by`.
    pub fn advance_by(&self, by: RationalTime) -> usize {
        let to = self.now() + by;
        self.advance_to(to)
    }

    /// Number of callbacks waiting to fire.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Time of the earliest waiting callback.
    pub fn next_deadline(&self) -> Option<RationalTime> {
        self.state.lock().pending.keys().next().map(|(at, _)| *at)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> RationalTime {
        self.state.lock().now
    }

    fn schedule_at(&self, at: RationalTime, callback: ClockCallback) {
        let mut state = self.state.lock();
        let seq = state.seq;
        state.seq += 1;
        state.pending.insert((at, seq), callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn recorder() -> (Arc<Mutex<Vec<(u32, RationalTime)>>>, impl Fn(u32) -> ClockCallback) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let make = move |id: u32| -> ClockCallback {
            let sink = sink.clone();
            Box::new(move |at| sink.lock().push((id, at)))
        };
        (fired, make)
    }

    #[test]
    fn test_manual_clock_fires_in_time_order() {
        let clock = ManualClock::new();
        let (fired, cb) = recorder();

        clock.schedule_at(RationalTime::new(2, 30), cb(2));
        clock.schedule_at(RationalTime::new(1, 90000), cb(1));
        clock.schedule_at(RationalTime::new(2, 30), cb(3));
        clock.schedule_at(RationalTime::new(5, 1), cb(4));

        assert_eq!(clock.advance_to(RationalTime::new(1, 1)), 3);
        assert_eq!(clock.pending(), 1);
        assert_eq!(clock.now(), RationalTime::new(1, 1));

        let ids: Vec<u32> = fired.lock().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(fired.lock()[1].1, RationalTime::new(6000, 90000));
    }

    #[test]
    fn test_manual_clock_callbacks_can_reschedule() {
        let clock = Arc::new(ManualClock::new());
        let (fired, cb) = recorder();

        let inner = clock.clone();
        let follow_up = cb(2);
        clock.schedule_at(
            RationalTime::from_millis(10),
            Box::new(move |at| inner.schedule_at(at + RationalTime::from_millis(10), follow_up)),
        );

        assert_eq!(clock.advance_by(RationalTime::from_millis(100)), 2);
        assert_eq!(fired.lock()[0], (2, RationalTime::from_millis(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_fires_at_deadline() {
        let clock = TokioClock::new();
        let (fired, cb) = recorder();

        clock.schedule_at(RationalTime::from_millis(50), cb(2));
        clock.schedule_at(RationalTime::from_millis(10), cb(1));
        clock.schedule_at(RationalTime::from_millis(50), cb(3));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.lock().len(), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        let fired = fired.lock();
        let ids: Vec<u32> = fired.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(fired[1].1 >= RationalTime::from_millis(50));
    }
}
