//! Clock callbacks left behind by the scheduler.
//!
//! Callbacks only hold a `Weak` on the source: once the source is gone (or has
//! been closed) a firing callback does nothing.

use super::scheduler::Shared;
use crate::av::CodedSample;
use crate::time::RationalTime;
use std::sync::Arc;

/// Schedules `sample` for delivery at clock time `at`.
pub(crate) fn schedule_sample(shared: &Arc<Shared>, at: RationalTime, sample: CodedSample, generation: u64) {
    let source = Arc::downgrade(shared);
    shared.clock.schedule_at(
        at,
        Box::new(move |fired_at| {
            if let Some(shared) = source.upgrade() {
                shared.deliver(sample, fired_at, generation);
            }
        }),
    );
}

/// Schedules the end-of-source notification at `at`, after the last sample.
pub(crate) fn schedule_end(shared: &Arc<Shared>, at: RationalTime, generation: u64) {
    let source = Arc::downgrade(shared);
    shared.clock.schedule_at(
        at,
        Box::new(move |_| {
            if let Some(shared) = source.upgrade() {
                shared.notify_end(generation);
            }
        }),
    );
}
