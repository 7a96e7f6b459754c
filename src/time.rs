//! # Rational Time
//!
//! Media timestamps arrive in whatever timebase the container chose (1/90000 for
//! MPEG-TS, 1/30 for a constant-rate video track, microseconds for a clock...).
//! [`RationalTime`] keeps them exact: a time is `value / scale` seconds, and every
//! arithmetic or comparison first brings both operands to the least common multiple
//! of their scales, so nothing is lost to floating point and ordering is preserved.
//!
//! ```rust
//! use playout::time::RationalTime;
//!
//! let frame = RationalTime::new(1, 30);
//! let tick = RationalTime::new(3000, 90000);
//! assert_eq!(frame, tick);
//! assert_eq!((frame + tick).scale(), 90000);
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::time::Duration;

/// Microseconds per second, the scale used for wall-clock conversions.
pub const MICROS: u64 = 1_000_000;

/// A point or span on a media timeline, expressed as `value / scale` seconds.
///
/// Two values with different scales but equal ratios compare (and hash) equal.
#[derive(Clone, Copy)]
pub struct RationalTime {
    value: i64,
    scale: u64,
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl RationalTime {
    /// Zero seconds on a unit scale.
    pub const ZERO: RationalTime = RationalTime { value: 0, scale: 1 };

    /// Creates `value / scale`.
    ///
    /// # Panics
    ///
    /// Panics if `scale` is zero.
    pub const fn new(value: i64, scale: u64) -> Self {
        assert!(scale > 0, "RationalTime scale must be positive");
        Self { value, scale }
    }

    /// Zero expressed in the given scale.
    pub const fn zero(scale: u64) -> Self {
        Self::new(0, scale)
    }

    /// Converts a tick count in `timebase` (the duration of one tick) into a time.
    ///
    /// A `1/90000` timebase and `ticks = 180000` yields two seconds at scale 90000.
    pub fn from_ticks(ticks: i64, timebase: RationalTime) -> Self {
        Self::from_wide_keep_scale(
            ticks as i128 * timebase.value as i128,
            timebase.scale as u128,
        )
    }

    /// Creates a time from whole milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Self::new(millis, 1000)
    }

    /// Creates a time from a [`Duration`] at microsecond precision.
    pub fn from_duration(duration: Duration) -> Self {
        let micros = duration.as_micros().min(i64::MAX as u128) as i64;
        Self::new(micros, MICROS)
    }

    /// Numerator.
    pub const fn value(&self) -> i64 {
        self.value
    }

    /// Denominator, always positive.
    pub const fn scale(&self) -> u64 {
        self.scale
    }

    /// Approximate seconds, for logging and display only.
    pub fn as_secs_f64(&self) -> f64 {
        self.value as f64 / self.scale as f64
    }

    /// Converts to a [`Duration`], rounding down to whole nanoseconds.
    /// Negative times have no duration and return `None`.
    pub fn to_duration(&self) -> Option<Duration> {
        if self.value < 0 {
            return None;
        }
        let nanos = self.value as u128 * 1_000_000_000 / self.scale as u128;
        Some(Duration::from_nanos(nanos.min(u64::MAX as u128) as u64))
    }

    /// Re-expresses the time in `scale`, rounding to the nearest unit.
    ///
    /// # Panics
    ///
    /// Panics if `scale` is zero.
    pub fn rescale(&self, scale: u64) -> Self {
        assert!(scale > 0, "RationalTime scale must be positive");
        let num = self.value as i128 * scale as i128;
        let den = self.scale as i128;
        let rounded = if num >= 0 {
            (num + den / 2) / den
        } else {
            (num - den / 2) / den
        };
        Self::new(clamp_i64(rounded), scale)
    }

    /// Returns the same ratio in lowest terms.
    pub fn reduced(&self) -> Self {
        Self::from_wide(self.value as i128, self.scale as u128)
    }

    /// Builds a time from a wide intermediate, reducing it and, if it still does
    /// not fit, rounding it onto the largest scale that does.
    fn from_wide(value: i128, scale: u128) -> Self {
        let g = gcd(value.unsigned_abs(), scale).max(1);
        let (mut value, mut scale) = (value / g as i128, scale / g);
        while scale > u64::MAX as u128 || value > i64::MAX as i128 || value < i64::MIN as i128 {
            if scale == 1 {
                return Self::new(clamp_i64(value), 1);
            }
            value /= 2;
            scale /= 2;
        }
        Self::new(value as i64, scale as u64)
    }

    /// Brings both operands to the least common multiple of their scales.
    fn common(self, other: Self) -> (i128, i128, u128) {
        let (a, b) = (self.scale as u128, other.scale as u128);
        let lcm = a / gcd(a, b) * b;
        let lhs = self.value as i128 * (lcm / a) as i128;
        let rhs = other.value as i128 * (lcm / b) as i128;
        (lhs, rhs, lcm)
    }
}

fn clamp_i64(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

impl Default for RationalTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for RationalTime {
    type Output = RationalTime;

    fn add(self, rhs: RationalTime) -> RationalTime {
        let (lhs, rhs, scale) = self.common(rhs);
        Self::from_wide_keep_scale(lhs.saturating_add(rhs), scale)
    }
}

impl Sub for RationalTime {
    type Output = RationalTime;

    fn sub(self, rhs: RationalTime) -> RationalTime {
        let (lhs, rhs, scale) = self.common(rhs);
        Self::from_wide_keep_scale(lhs.saturating_sub(rhs), scale)
    }
}

impl RationalTime {
    /// Keeps the common scale when it fits so that results stay in the
    /// operands' own units (1/30 + 1/30 is 2/30, not 1/15).
    fn from_wide_keep_scale(value: i128, scale: u128) -> Self {
        if scale <= u64::MAX as u128 && value >= i64::MIN as i128 && value <= i64::MAX as i128 {
            Self::new(value as i64, scale as u64)
        } else {
            Self::from_wide(value, scale)
        }
    }
}

impl AddAssign for RationalTime {
    fn add_assign(&mut self, rhs: RationalTime) {
        *self = *self + rhs;
    }
}

impl SubAssign for RationalTime {
    fn sub_assign(&mut self, rhs: RationalTime) {
        *self = *self - rhs;
    }
}

impl Neg for RationalTime {
    type Output = RationalTime;

    fn neg(self) -> RationalTime {
        Self::new(self.value.saturating_neg(), self.scale)
    }
}

impl PartialEq for RationalTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RationalTime {}

impl PartialOrd for RationalTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RationalTime {
    fn cmp(&self, other: &Self) -> Ordering {
        // i64 * u64 always fits in i128, so cross-multiplying is exact.
        let lhs = self.value as i128 * other.scale as i128;
        let rhs = other.value as i128 * self.scale as i128;
        lhs.cmp(&rhs)
    }
}

impl Hash for RationalTime {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let reduced = self.reduced();
        reduced.value.hash(state);
        reduced.scale.hash(state);
    }
}

impl fmt::Debug for RationalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.scale)
    }
}

impl fmt::Display for RationalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

impl From<Duration> for RationalTime {
    fn from(duration: Duration) -> Self {
        Self::from_duration(duration)
    }
}
