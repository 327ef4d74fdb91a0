use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::{Clock, Instant, SystemClock};
use crate::error::{Error, Result};
use crate::sketch::Sketch;
use crate::snapshot::Snapshot;

struct Inner {
    prev: Sketch,
    cur: Sketch,
    cur_begin: Instant,
}

/// Composes two Sketches into a rolling two-bucket time window so that
/// `snapshot` reflects only recently observed data.
///
/// Grounded on the lock-guarded `Inner` pattern the surrounding ecosystem
/// uses for a metrics collector (a single mutex around the whole mutable
/// state, acquired once per public call) and the two-bucket
/// rotate-or-reset window shape of a rolling percentile tracker; the
/// specific rotation rule (read from `prev`, not `cur`; reset both on a
/// ≥2W gap) is this crate's own.
pub struct WindowedSampler<C: Clock = SystemClock> {
    clock: C,
    window_secs: u64,
    inner: Mutex<Inner>,
}

impl WindowedSampler<SystemClock> {
    /// A Sampler over the default quantile targets, using the system
    /// clock, with window width `window`.
    pub fn new(window: Duration) -> Result<Self> {
        Self::with_clock(SystemClock::new(), window)
    }
}

impl<C: Clock> WindowedSampler<C> {
    pub fn with_clock(clock: C, window: Duration) -> Result<Self> {
        Self::with_clock_and_targets(clock, window, &[(0.99, 0.001), (0.5, 0.001)])
    }

    /// Validates eagerly (non-zero window, valid quantile targets) so
    /// that no later `update`/`snapshot` call can fail on configuration.
    pub fn with_clock_and_targets(
        clock: C,
        window: Duration,
        targets: &[(f64, f64)],
    ) -> Result<Self> {
        let window_secs = window.as_secs();
        if window_secs == 0 {
            return Err(Error::invalid_argument(
                "window size must be at least one second",
            ));
        }
        let prev = Sketch::try_new(targets)?;
        let cur = Sketch::try_new(targets)?;
        let cur_begin = clock.now().align(window_secs);
        Ok(Self {
            clock,
            window_secs,
            inner: Mutex::new(Inner {
                prev,
                cur,
                cur_begin,
            }),
        })
    }

    /// Rotates or resets the window pair for an operation timestamped
    /// `ts`. Returns `false` if `ts` predates the current window, in
    /// which case the caller must treat the operation as a no-op.
    fn advance_windows(inner: &mut Inner, ts: Instant, window_secs: u64) -> bool {
        if ts < inner.cur_begin {
            log::trace!(
                "rejecting past-dated operation at {:?}, current window begins at {:?}",
                ts,
                inner.cur_begin
            );
            return false;
        }
        let cur_end = inner.cur_begin.plus_secs(window_secs);
        if ts < cur_end {
            return true;
        }
        let next_end = cur_end.plus_secs(window_secs);
        if ts < next_end {
            log::debug!("rotating window: new cur_begin={:?}", cur_end);
            std::mem::swap(&mut inner.prev, &mut inner.cur);
            inner.cur.reset();
            inner.cur_begin = cur_end;
            return true;
        }
        let aligned = ts.align(window_secs);
        log::debug!(
            "gap of >= 2 windows at {:?}, resetting both buckets to {:?}",
            ts,
            aligned
        );
        inner.prev.reset();
        inner.cur.reset();
        inner.cur_begin = aligned;
        true
    }

    pub fn update(&self, value: f64) {
        self.update_at(value, self.clock.now())
    }

    pub fn update_at(&self, value: f64, ts: Instant) {
        let mut inner = self.inner.lock();
        if Self::advance_windows(&mut inner, ts, self.window_secs) {
            if let Err(e) = inner.cur.insert(value) {
                log::debug!("dropping invalid observation: {e}");
            }
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_at(self.clock.now())
    }

    /// Returns a Snapshot over the *previous* completed window, so the
    /// result never reflects a partially-filled current bucket.
    pub fn snapshot_at(&self, ts: Instant) -> Snapshot {
        let mut inner = self.inner.lock();
        if Self::advance_windows(&mut inner, ts, self.window_secs) {
            Snapshot::from_sketch(&mut inner.prev)
        } else {
            Snapshot::empty()
        }
    }

    pub fn size(&self) -> u64 {
        self.size_at(self.clock.now())
    }

    pub fn size_at(&self, ts: Instant) -> u64 {
        self.snapshot_at(ts).size()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.prev.reset();
        inner.cur.reset();
        inner.cur_begin = self.clock.now().align(self.window_secs);
    }
}

/// The windowed-sampler interface an upstream metrics collaborator (a
/// Histogram/Timer wrapper, say) consumes, independent of the concrete
/// clock a given `WindowedSampler` is parameterized over.
pub trait Sampler {
    fn clear(&self);
    fn size(&self) -> u64;
    fn size_at(&self, ts: Instant) -> u64;
    fn update(&self, value: i64);
    fn update_at(&self, value: i64, ts: Instant);
    fn snapshot(&self) -> Snapshot;
    fn snapshot_at(&self, ts: Instant) -> Snapshot;
}

impl<C: Clock> Sampler for WindowedSampler<C> {
    fn clear(&self) {
        WindowedSampler::clear(self)
    }

    fn size(&self) -> u64 {
        WindowedSampler::size(self)
    }

    fn size_at(&self, ts: Instant) -> u64 {
        WindowedSampler::size_at(self, ts)
    }

    fn update(&self, value: i64) {
        WindowedSampler::update(self, value as f64)
    }

    fn update_at(&self, value: i64, ts: Instant) {
        WindowedSampler::update_at(self, value as f64, ts)
    }

    fn snapshot(&self) -> Snapshot {
        WindowedSampler::snapshot(self)
    }

    fn snapshot_at(&self, ts: Instant) -> Snapshot {
        WindowedSampler::snapshot_at(self, ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn sampler_at(window_secs: u64, start: u64) -> (Arc<ManualClock>, WindowedSampler<Arc<ManualClock>>) {
        let clock = Arc::new(ManualClock::at(start));
        let sampler =
            WindowedSampler::with_clock(Arc::clone(&clock), Duration::from_secs(window_secs))
                .unwrap();
        (clock, sampler)
    }

    #[test]
    fn rejects_non_positive_window() {
        assert!(WindowedSampler::new(Duration::from_secs(0)).is_err());
    }

    #[test]
    fn window_retention_s4() {
        let (clock, sampler) = sampler_at(30, 0);
        for t in 0..300u64 {
            clock.set(t);
            sampler.update(100.0);
        }
        clock.set(299);
        assert_eq!(sampler.size(), 30);
        assert_eq!(sampler.snapshot().value_at(0.5), 100.0);
    }

    #[test]
    fn mixed_bucket_boundary_s5() {
        let (clock, sampler) = sampler_at(30, 0);
        for t in 0..30u64 {
            clock.set(t);
            sampler.update(1.0);
        }
        for t in 30..45u64 {
            clock.set(t);
            sampler.update(2.0);
        }
        clock.set(45);
        assert_eq!(sampler.snapshot().value_at(0.5), 1.0);
    }

    #[test]
    fn gap_resets_both_buckets_s6() {
        let (clock, sampler) = sampler_at(30, 0);
        for _ in 0..10 {
            sampler.update(1.0);
        }
        clock.set(100);
        sampler.update(10.0);
        sampler.update(10.0);
        clock.set(130);
        assert_eq!(sampler.snapshot().size(), 2);
    }

    #[test]
    fn past_dated_update_is_silently_dropped() {
        let (clock, sampler) = sampler_at(30, 0);
        sampler.update(5.0); // t=0, lands in the [0, 30) window
        clock.set(35);
        sampler.update(6.0); // rotates: prev becomes the completed [0, 30) bucket
        clock.set(5); // now older than cur_begin (30); must be dropped
        sampler.update(999.0);
        clock.set(35);
        let snap = sampler.snapshot();
        assert_eq!(snap.size(), 1);
        assert_eq!(snap.value_at(0.5), 5.0);
    }

    #[test]
    fn clear_resets_both_buckets() {
        let (clock, sampler) = sampler_at(30, 0);
        sampler.update(1.0);
        clock.set(40);
        sampler.update(2.0);
        sampler.clear();
        assert_eq!(sampler.snapshot().size(), 0);
    }

    #[test]
    fn sampler_trait_forwards_i64_values() {
        let (_, sampler) = sampler_at(30, 0);
        Sampler::update(&sampler, 7);
        assert_eq!(Sampler::size(&sampler), 0);
    }
}
