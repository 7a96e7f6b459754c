#![doc(html_root_url = "https://docs.rs/playout/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # playout - clock-synchronized media playout
//!
//! `playout` takes the compressed packets a demuxer produces and delivers them
//! to a consumer as timed samples, each at the wall-clock moment it is due.
//! Demuxing itself is left to an external [`format::Demuxer`]; this crate owns
//! the timed delivery pipeline around it.
//!
//! ## Features
//!
//! - Exact rational timestamps across heterogeneous timebases (1/30, 1/90000, ...)
//! - Bounded read-ahead: at most a fixed window of future samples is queued
//! - Clock-driven emission on a pluggable [`clock::Clock`]
//! - Seamless looping with a monotonic output timeline
//! - Deterministic [`clock::ManualClock`] and scripted [`format::MemoryDemuxer`]
//!   for tests and simulations
//!
//! ## Quick Start
//!
//! ```rust
//! use playout::clock::{Clock, ManualClock};
//! use playout::av::{CodedSample, Disposition, Packet};
//! use playout::format::{Demuxer, MemoryDemuxer, StreamInfo};
//! use playout::source::{Source, SourceOptions};
//! use playout::time::RationalTime;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> playout::Result<()> {
//! let demuxer = MemoryDemuxer::new(vec![StreamInfo::new(0, 27, 0, RationalTime::new(1, 30))])
//!     .with_packets((0..30).map(|i| Packet::new(vec![0u8; 16]).with_dts(i)));
//! let opener = move |_: &url::Url| -> playout::Result<Box<dyn Demuxer>> {
//!     Ok(Box::new(demuxer.clone()))
//! };
//!
//! let clock = Arc::new(ManualClock::new());
//! let sink = |sample: CodedSample| {
//!     println!("{} at {}", sample.dts, sample.emitted_at);
//!     Disposition::Continue
//! };
//!
//! let source = Source::open(
//!     clock.clone(),
//!     "memory://clip",
//!     &opener,
//!     Arc::new(sink),
//!     SourceOptions::new("clip", "default"),
//! )
//! .await?;
//!
//! source.play();
//! source.wait_idle().await;
//! clock.advance_by(RationalTime::from_millis(100));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - `time`: rational time values and timebase conversion
//! - `av`: media types, formats, packets and emitted samples
//! - `format`: the demuxer boundary and an in-memory demuxer
//! - `clock`: the clock abstraction, a tokio-backed clock and a manual clock
//! - `sink`: sample consumers
//! - `source`: the timed source (descriptor table, read-ahead scheduler, emitter)
//! - `config`: process-wide defaults from environment and config file
//! - `error`: error type and result alias

/// Rational time values
pub mod time;

/// Audio/Video base types
pub mod av;

/// Demuxer boundary
pub mod format;

/// Clock abstraction and implementations
pub mod clock;

/// Sample consumers
pub mod sink;

/// Timed sources
pub mod source;

/// Configuration module
pub mod config;

/// Error types and utilities
pub mod error;

pub use error::{PlayoutError, Result};
pub use source::{Source, SourceOptions};
