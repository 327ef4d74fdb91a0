//! Windowed, ε-approximate streaming quantiles.
//!
//! [`Sketch`] implements the CKMS biased-quantile algorithm directly:
//! buffered insertion, one-pass compression, and targeted-quantile
//! queries within a configured error bound. [`WindowedSampler`] composes
//! two Sketches into a rolling time window, so a reader always sees a
//! fully-formed recent window rather than a partially-filled one.
//! [`Snapshot`] is the detached, immutable read view the Sampler hands
//! out.
//!
//! This crate does not emit metrics, format output, or manage metric
//! identities — it is the estimator core an upstream metrics library
//! embeds.

mod clock;
mod error;
mod quantile;
mod sampler;
mod sketch;
mod snapshot;

pub use clock::{Clock, Instant, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use quantile::QuantileTarget;
pub use sampler::{Sampler, WindowedSampler};
pub use sketch::Sketch;
pub use snapshot::Snapshot;

/// Fixed capacity of a Sketch's pending-insert buffer before it is
/// drained into the sample sequence.
pub const BUFFER_CAP: usize = 500;

/// Default window width for a [`WindowedSampler`] built with [`WindowedSampler::new`].
pub const DEFAULT_WINDOW: std::time::Duration = std::time::Duration::from_secs(30);
