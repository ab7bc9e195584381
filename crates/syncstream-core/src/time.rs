//! Time primitives for SyncStream
//!
//! All stream and command times live in one shared time base, expressed as
//! floating-point seconds. Two clock modes produce them:
//! - Synchronized: logical time, `origin + n / rate`, replayable
//! - Realtime: wall-clock reads taken at emission

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A point in the shared time base, in seconds
#[derive(Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Timestamp(pub f64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0.0);

    #[inline]
    pub fn from_secs_f64(secs: f64) -> Self {
        Timestamp(secs)
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0
    }

    /// Shift by a signed number of seconds
    #[inline]
    pub fn offset(self, secs: f64) -> Self {
        Timestamp(self.0 + secs)
    }

    /// Signed seconds elapsed from `earlier` to `self`
    #[inline]
    pub fn since(self, earlier: Timestamp) -> f64 {
        self.0 - earlier.0
    }

    #[inline]
    pub fn max(self, other: Timestamp) -> Self {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }

    #[inline]
    pub fn min(self, other: Timestamp) -> Self {
        if other.0 < self.0 {
            other
        } else {
            self
        }
    }

    /// Smallest representable timestamp strictly greater than `self`
    pub fn next_up(self) -> Self {
        let x = self.0;
        if x.is_nan() || x == f64::INFINITY {
            return self;
        }
        if x == 0.0 {
            return Timestamp(f64::from_bits(1));
        }
        let bits = x.to_bits();
        let next = if x > 0.0 { bits + 1 } else { bits - 1 };
        Timestamp(f64::from_bits(next))
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0 + rhs.as_secs_f64())
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn sub(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0 - rhs.as_secs_f64())
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t({:.6}s)", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// How a stream derives sample timestamps
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    /// Arithmetic logical time from a shared origin
    #[default]
    Synchronized,
    /// Wall-clock reads at emission
    Realtime,
}

impl ClockMode {
    #[inline]
    pub fn is_synchronized(self) -> bool {
        matches!(self, ClockMode::Synchronized)
    }
}

impl fmt::Display for ClockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockMode::Synchronized => f.write_str("synchronized"),
            ClockMode::Realtime => f.write_str("realtime"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp::from_secs_f64(1.5);
        assert_eq!(t + Duration::from_millis(500), Timestamp(2.0));
        assert_eq!(t - Duration::from_millis(500), Timestamp(1.0));
        assert_eq!(Timestamp(3.0).since(t), 1.5);
        assert_eq!(t.since(Timestamp(3.0)), -1.5);
    }

    #[test]
    fn test_next_up_is_strictly_greater() {
        for x in [0.0, 1e-9, 0.5, 4.5, 1.7e9, -2.0] {
            let t = Timestamp(x);
            assert!(t.next_up() > t, "next_up of {x} not greater");
        }
    }

    #[test]
    fn test_max() {
        assert_eq!(Timestamp(1.0).max(Timestamp(2.0)), Timestamp(2.0));
        assert_eq!(Timestamp(3.0).max(Timestamp(2.0)), Timestamp(3.0));
    }

    #[test]
    fn test_min_picks_earliest_wake() {
        assert_eq!(Timestamp(1.0).min(Timestamp(2.0)), Timestamp(1.0));
        assert_eq!(Timestamp(3.0).min(Timestamp(2.0)), Timestamp(2.0));
        let earliest = [Timestamp(4.5), Timestamp(-1.0), Timestamp(0.25)]
            .into_iter()
            .reduce(Timestamp::min);
        assert_eq!(earliest, Some(Timestamp(-1.0)));
    }
}
