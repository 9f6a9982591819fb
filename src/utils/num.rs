//! Numeric utilities: saturating conversions used by metrics and counters.
//!
//! Counters and timings are best-effort, so every conversion here clamps
//! instead of panicking or silently truncating.

use std::time::Duration;

#[inline]
#[must_use]
pub fn usize_to_u64(v: usize) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

#[inline]
#[must_use]
pub fn u128_to_u64_saturating(v: u128) -> u64 {
    if v > u128::from(u64::MAX) { u64::MAX } else { v as u64 }
}

#[inline]
#[must_use]
pub fn i64_to_u64_saturating_nonnegative(v: i64) -> u64 {
    if v <= 0 { 0 } else { v as u64 }
}

/// Elapsed time in whole microseconds, clamped to `u64`.
#[inline]
#[must_use]
pub fn duration_micros(d: Duration) -> u64 {
    u128_to_u64_saturating(d.as_micros())
}

/// Elapsed time in whole nanoseconds, clamped to `u64`.
#[inline]
#[must_use]
pub fn duration_nanos(d: Duration) -> u64 {
    u128_to_u64_saturating(d.as_nanos())
}

/// `part / whole * 100`, or 0 when `whole` is 0.
#[inline]
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 { 0.0 } else { part as f64 / whole as f64 * 100.0 }
}
