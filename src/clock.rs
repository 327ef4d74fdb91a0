use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A second-resolution point in time, as seen by a [`Clock`].
///
/// Internally just seconds since some clock-defined origin; the origin
/// only has to be consistent within a single `Clock` instance; callers
/// never construct an `Instant` from an absolute wall-clock timestamp and
/// expect it to compare meaningfully across two different `Clock`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(u64);

impl Instant {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// The start of the `window_secs`-wide interval containing `self`.
    pub fn align(&self, window_secs: u64) -> Self {
        Self(self.0 - (self.0 % window_secs))
    }

    pub fn plus_secs(&self, secs: u64) -> Self {
        Self(self.0 + secs)
    }
}

/// A monotonically-non-decreasing source of [`Instant`]s.
///
/// Mirrors the split the surrounding ecosystem draws between a real
/// monotonic clock and a test double an operator can advance by hand
/// (`quanta::Clock` vs. `quanta::Clock::mock()`'s controllable handle).
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Production clock, backed by a monotonic timing source sampled once at
/// construction so every `Instant` is seconds elapsed since the process
/// (or at least this `SystemClock`) started observing time.
pub struct SystemClock {
    inner: quanta::Clock,
    origin: quanta::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        let inner = quanta::Clock::new();
        let origin = inner.now();
        Self { inner, origin }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::from_secs(self.inner.now().duration_since(self.origin).as_secs())
    }
}

/// A test clock an operator advances explicitly instead of reading real
/// time. Every `WindowedSampler` scenario test in this crate drives one
/// of these rather than racing the wall clock.
pub struct ManualClock {
    secs: AtomicU64,
}

impl ManualClock {
    /// A clock starting at `t = 0`.
    pub fn new() -> Self {
        Self::at(0)
    }

    pub fn at(secs: u64) -> Self {
        Self {
            secs: AtomicU64::new(secs),
        }
    }

    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_secs: u64) {
        self.secs.fetch_add(delta_secs, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::from_secs(self.secs.load(Ordering::SeqCst))
    }
}

/// Lets a shared, reference-counted clock (e.g. a `ManualClock` driven
/// from a test while a `WindowedSampler` holds its own handle) satisfy
/// `Clock` directly.
impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_rounds_down_to_window_start() {
        let t = Instant::from_secs(95);
        assert_eq!(t.align(30).as_secs(), 90);
        assert_eq!(Instant::from_secs(0).align(30).as_secs(), 0);
        assert_eq!(Instant::from_secs(29).align(30).as_secs(), 0);
        assert_eq!(Instant::from_secs(30).align(30).as_secs(), 30);
    }

    #[test]
    fn manual_clock_advances_on_command() {
        let clock = ManualClock::new();
        assert_eq!(clock.now().as_secs(), 0);
        clock.advance(10);
        assert_eq!(clock.now().as_secs(), 10);
        clock.set(100);
        assert_eq!(clock.now().as_secs(), 100);
    }

    #[test]
    fn system_clock_is_non_decreasing() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
