//! Clock implementations for SyncStream
//!
//! `WallClock` is the only source of "now". `ClockSource` turns sample
//! indices into timestamps for one stream.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use syncstream_core::{ClockMode, SyncError, SyncResult, Timestamp};

/// Tolerance used when mapping a time back onto the sample grid
pub const GRID_EPSILON: f64 = 1e-9;

/// Source of wall-clock time in the shared time base
pub trait WallClock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// System wall clock
///
/// Clones share the same epoch, so timestamps taken by different streams of
/// one process are directly comparable.
#[derive(Clone, Debug)]
pub struct SystemClock {
    base: ClockBase,
}

#[derive(Clone, Copy, Debug)]
enum ClockBase {
    /// Monotonic seconds since a process-local epoch
    Monotonic(Instant),
    /// Seconds since the Unix epoch, comparable across processes
    Unix,
}

impl SystemClock {
    /// Monotonic clock starting at zero now
    pub fn new() -> Self {
        SystemClock {
            base: ClockBase::Monotonic(Instant::now()),
        }
    }

    /// Unix-epoch clock for coordinating separate processes
    pub fn unix() -> Self {
        SystemClock {
            base: ClockBase::Unix,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemClock {
    fn now(&self) -> Timestamp {
        match self.base {
            ClockBase::Monotonic(epoch) => Timestamp(epoch.elapsed().as_secs_f64()),
            ClockBase::Unix => {
                let secs = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);
                Timestamp(secs)
            }
        }
    }
}

/// Manually driven clock for simulation and tests
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    value: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        ManualClock {
            value: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, secs: f64) {
        *self.value.lock() = secs;
    }

    pub fn advance(&self, secs: f64) {
        *self.value.lock() += secs;
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(*self.value.lock())
    }
}

impl<C: WallClock + ?Sized> WallClock for Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// How a command time is mapped onto the sample grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Index whose nominal timestamp is closest to the command time
    #[default]
    Nearest,
    /// Last index at or before the command time
    AtOrBefore,
    /// First index at or after the command time
    AtOrAfter,
}

impl BoundaryPolicy {
    /// Map a fractional grid position to an index
    pub fn apply(self, position: f64) -> u64 {
        let index = match self {
            BoundaryPolicy::Nearest => position.round(),
            BoundaryPolicy::AtOrBefore => (position + GRID_EPSILON).floor(),
            BoundaryPolicy::AtOrAfter => (position - GRID_EPSILON).ceil(),
        };
        if index <= 0.0 {
            0
        } else {
            index as u64
        }
    }
}

/// Timestamp generator for one stream
#[derive(Clone, Debug)]
pub struct ClockSource {
    mode: ClockMode,
    sample_rate: f64,
    /// Logical origin (synchronized mode); fixed by the first start if unset
    origin: Option<Timestamp>,
    /// Last realtime read, keeps realtime timestamps strictly increasing
    last_read: Option<Timestamp>,
}

impl ClockSource {
    pub fn new(mode: ClockMode, sample_rate: f64, origin: Option<Timestamp>) -> SyncResult<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(SyncError::InvalidConfiguration(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        if let Some(origin) = origin {
            if !origin.is_finite() {
                return Err(SyncError::InvalidConfiguration(
                    "origin time must be finite".into(),
                ));
            }
        }
        Ok(ClockSource {
            mode,
            sample_rate,
            // Realtime streams have no arithmetic ground truth.
            origin: origin.filter(|_| mode.is_synchronized()),
            last_read: None,
        })
    }

    pub fn synchronized(sample_rate: f64, origin: Timestamp) -> SyncResult<Self> {
        Self::new(ClockMode::Synchronized, sample_rate, Some(origin))
    }

    pub fn realtime(sample_rate: f64) -> SyncResult<Self> {
        Self::new(ClockMode::Realtime, sample_rate, None)
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Nominal spacing between samples in seconds
    pub fn period(&self) -> f64 {
        1.0 / self.sample_rate
    }

    pub fn origin(&self) -> Option<Timestamp> {
        self.origin
    }

    pub fn set_origin(&mut self, origin: Timestamp) {
        self.origin = Some(origin);
    }

    /// Arithmetic timestamp of sample `n`, if the origin is known
    ///
    /// Computed in closed form per index so no error accumulates.
    #[inline]
    pub fn nominal(&self, n: u64) -> Option<Timestamp> {
        self.origin
            .map(|origin| Timestamp(origin.0 + n as f64 / self.sample_rate))
    }

    /// Timestamp for sample `n` at emission
    pub fn timestamp(&mut self, n: u64, wall: &dyn WallClock) -> Timestamp {
        match self.mode {
            ClockMode::Synchronized => match self.nominal(n) {
                Some(t) => t,
                None => {
                    // First emission fixes the origin.
                    let origin = wall.now();
                    self.origin = Some(origin);
                    Timestamp(origin.0 + n as f64 / self.sample_rate)
                }
            },
            ClockMode::Realtime => {
                let mut t = wall.now();
                if let Some(last) = self.last_read {
                    if t <= last {
                        t = last.next_up();
                    }
                }
                self.last_read = Some(t);
                t
            }
        }
    }

    /// Grid index for a time under `policy` (synchronized with a known origin)
    pub fn index_for(&self, t: Timestamp, policy: BoundaryPolicy) -> Option<u64> {
        let origin = self.origin?;
        Some(policy.apply(t.since(origin) * self.sample_rate))
    }

    /// Nominal slots strictly between `after` and `before`
    pub fn slots_between(&self, after: Timestamp, before: Timestamp) -> u64 {
        let span = before.since(after) * self.sample_rate;
        if span <= 0.0 {
            return 0;
        }
        let slots = (span - GRID_EPSILON).ceil() - 1.0;
        if slots <= 0.0 {
            0
        } else {
            slots as u64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rejects_non_positive_rate() {
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = ClockSource::new(ClockMode::Synchronized, rate, None).unwrap_err();
            assert!(matches!(err, SyncError::InvalidConfiguration(_)));
        }
    }

    #[test]
    fn test_synchronized_is_replayable() {
        let wall = ManualClock::new(100.0);
        let mut clock = ClockSource::synchronized(2.0, Timestamp(0.0)).unwrap();

        let first = clock.timestamp(7, &wall);
        wall.advance(42.0);
        let again = clock.timestamp(7, &wall);

        assert_eq!(first, Timestamp(3.5));
        assert_eq!(first, again);
    }

    #[test]
    fn test_synchronized_origin_fixed_on_first_emission() {
        let wall = ManualClock::new(10.0);
        let mut clock = ClockSource::new(ClockMode::Synchronized, 4.0, None).unwrap();

        assert_eq!(clock.nominal(0), None);
        assert_eq!(clock.timestamp(0, &wall), Timestamp(10.0));
        assert_eq!(clock.origin(), Some(Timestamp(10.0)));
        assert_eq!(clock.nominal(2), Some(Timestamp(10.5)));
    }

    #[test]
    fn test_realtime_strictly_increasing_on_frozen_clock() {
        let wall = ManualClock::new(5.0);
        let mut clock = ClockSource::realtime(100.0).unwrap();

        let a = clock.timestamp(0, &wall);
        let b = clock.timestamp(1, &wall);
        let c = clock.timestamp(2, &wall);

        assert_eq!(a, Timestamp(5.0));
        assert!(b > a);
        assert!(c > b);
    }

    #[test]
    fn test_realtime_reflects_wall_clock() {
        let wall = ManualClock::new(1.0);
        let mut clock = ClockSource::realtime(2.0).unwrap();

        clock.timestamp(0, &wall);
        wall.set(1.75);
        assert_eq!(clock.timestamp(1, &wall), Timestamp(1.75));
    }

    #[test]
    fn test_boundary_policies() {
        let clock = ClockSource::synchronized(2.0, Timestamp(0.0)).unwrap();

        // Exactly on the grid all policies agree.
        for policy in [
            BoundaryPolicy::Nearest,
            BoundaryPolicy::AtOrBefore,
            BoundaryPolicy::AtOrAfter,
        ] {
            assert_eq!(clock.index_for(Timestamp(3.0), policy), Some(6));
        }

        // Between grid points.
        assert_eq!(clock.index_for(Timestamp(3.1), BoundaryPolicy::Nearest), Some(6));
        assert_eq!(clock.index_for(Timestamp(3.4), BoundaryPolicy::Nearest), Some(7));
        assert_eq!(clock.index_for(Timestamp(3.4), BoundaryPolicy::AtOrBefore), Some(6));
        assert_eq!(clock.index_for(Timestamp(3.1), BoundaryPolicy::AtOrAfter), Some(7));

        // Before the origin clamps to zero.
        assert_eq!(clock.index_for(Timestamp(-5.0), BoundaryPolicy::AtOrAfter), Some(0));
    }

    #[test]
    fn test_slots_between() {
        let clock = ClockSource::realtime(2.0).unwrap();
        // 2.5, 3.0, 3.5 lie strictly between 2.0 and 4.0
        assert_eq!(clock.slots_between(Timestamp(2.0), Timestamp(4.0)), 3);
        assert_eq!(clock.slots_between(Timestamp(2.0), Timestamp(2.4)), 0);
        assert_eq!(clock.slots_between(Timestamp(4.0), Timestamp(2.0)), 0);
    }

    #[test]
    fn test_dyadic_rate_spacing_is_exact() {
        let clock = ClockSource::synchronized(2.0, Timestamp(0.0)).unwrap();
        for n in 0..10_000u64 {
            let a = clock.nominal(n).unwrap();
            let b = clock.nominal(n + 1).unwrap();
            assert_eq!(b.since(a), 0.5);
        }
    }

    proptest! {
        #[test]
        fn prop_synchronized_spacing_matches_period(
            rate in 1.0f64..10_000.0,
            origin in -1_000.0f64..1_000.0,
            n in 0u64..1_000_000,
        ) {
            let clock = ClockSource::synchronized(rate, Timestamp(origin)).unwrap();
            let a = clock.nominal(n).unwrap();
            let b = clock.nominal(n + 1).unwrap();
            prop_assert!((b.since(a) - 1.0 / rate).abs() < 1e-9);
        }

        #[test]
        fn prop_realtime_never_decreases(steps in proptest::collection::vec(0.0f64..0.01, 1..200)) {
            let wall = ManualClock::new(0.0);
            let mut clock = ClockSource::realtime(500.0).unwrap();
            let mut last = clock.timestamp(0, &wall);
            for (i, step) in steps.iter().enumerate() {
                wall.advance(*step);
                let t = clock.timestamp(i as u64 + 1, &wall);
                prop_assert!(t > last);
                last = t;
            }
        }

        #[test]
        fn prop_nearest_index_roundtrips(rate in 1.0f64..5_000.0, n in 0u64..1_000_000) {
            let clock = ClockSource::synchronized(rate, Timestamp(0.0)).unwrap();
            let t = clock.nominal(n).unwrap();
            prop_assert_eq!(clock.index_for(t, BoundaryPolicy::Nearest), Some(n));
            prop_assert_eq!(clock.index_for(t, BoundaryPolicy::AtOrBefore), Some(n));
            prop_assert_eq!(clock.index_for(t, BoundaryPolicy::AtOrAfter), Some(n));
        }
    }
}
