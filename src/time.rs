//! Conversion between wall-clock time and the 100-nanosecond "tick" epoch
//! (1601-01-01) used for key modification timestamps (spec §3, §4.7).

use std::time::{SystemTime, UNIX_EPOCH};

use crate::key::Ticks;

/// Ticks between 1601-01-01 and the Unix epoch (1970-01-01).
const TICKS_TO_UNIX_EPOCH: u64 = 116_444_736_000_000_000;

/// The current time expressed in ticks since 1601.
pub fn now_ticks() -> Ticks {
    let since_unix = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    TICKS_TO_UNIX_EPOCH + since_unix.as_nanos() as u64 / 100
}

/// Converts a tick timestamp to seconds since the Unix epoch, used for the
/// human-readable `[section] <epoch>` annotation in the text format (spec §4.7).
pub fn ticks_to_unix_seconds(ticks: Ticks) -> i64 {
    (ticks.saturating_sub(TICKS_TO_UNIX_EPOCH) / 10_000_000) as i64
}

/// Converts seconds since the Unix epoch to a tick timestamp.
pub fn unix_seconds_to_ticks(seconds: i64) -> Ticks {
    TICKS_TO_UNIX_EPOCH.saturating_add((seconds.max(0) as u64) * 10_000_000)
}
