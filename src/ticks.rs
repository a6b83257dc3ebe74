//! Conversion between `chrono::DateTime<Utc>` and the on-disk tick
//! representation: a signed 64-bit count of 100-nanosecond intervals since
//! 0001-01-01 00:00:00 UTC, matching the .NET `DateTime.Ticks` convention
//! that existing lock files on disk were written with.

use chrono::{DateTime, TimeZone, Utc};

/// One tick is 100 nanoseconds.
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks between the .NET epoch (0001-01-01) and the Unix epoch (1970-01-01).
/// This is the well-known `DateTime(1970, 1, 1).Ticks` constant.
const TICKS_AT_UNIX_EPOCH: i64 = 621_355_968_000_000_000;

/// The release instant returned when no lock file exists: the maximum
/// representable instant, so "no lock" never looks expired.
pub fn far_future() -> DateTime<Utc> {
    DateTime::<Utc>::MAX_UTC
}

/// The sentinel stored in a fresh handle's release cache: "never acquired".
pub fn far_past() -> DateTime<Utc> {
    DateTime::<Utc>::MIN_UTC
}

/// Convert a tick count to a UTC instant. Saturates to far_future/far_past
/// on overflow rather than panicking, since the value is untrusted file content.
pub fn datetime_from_ticks(ticks: i64) -> DateTime<Utc> {
    let unix_ticks = ticks.saturating_sub(TICKS_AT_UNIX_EPOCH);
    let secs = unix_ticks.div_euclid(TICKS_PER_SECOND);
    let rem_ticks = unix_ticks.rem_euclid(TICKS_PER_SECOND);
    let nanos = (rem_ticks * 100) as u32;
    match Utc.timestamp_opt(secs, nanos) {
        chrono::LocalResult::Single(dt) => dt,
        _ => {
            if ticks > 0 {
                far_future()
            } else {
                far_past()
            }
        }
    }
}

/// Convert a UTC instant to its tick count, saturating on overflow.
pub fn ticks_from_datetime(dt: DateTime<Utc>) -> i64 {
    let unix_ticks = dt.timestamp().saturating_mul(TICKS_PER_SECOND)
        + (dt.timestamp_subsec_nanos() as i64) / 100;
    unix_ticks.saturating_add(TICKS_AT_UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn unix_epoch_round_trips() {
        let dt = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let ticks = ticks_from_datetime(dt);
        assert_eq!(ticks, TICKS_AT_UNIX_EPOCH);
        assert_eq!(datetime_from_ticks(ticks), dt);
    }

    #[test]
    fn arbitrary_instant_round_trips_to_the_second() {
        let dt = DateTime::<Utc>::from_timestamp(1_700_000_000, 123_000_000).unwrap();
        let ticks = ticks_from_datetime(dt);
        let back = datetime_from_ticks(ticks);
        assert_eq!(back.timestamp(), dt.timestamp());
        assert!((back - dt).abs() < Duration::milliseconds(1));
    }

    #[test]
    fn far_future_is_greater_than_any_real_instant() {
        let now = Utc::now();
        assert!(far_future() > now);
        assert!(far_past() < now);
    }
}
