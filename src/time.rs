use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Wall-clock timestamp as carried on the wire.
///
/// `nanoseconds` is not required to be below one second; [`parse`] folds any
/// overflow (or negative remainder) into the seconds field.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEnvelope {
    pub seconds: i64,
    pub nanoseconds: i64,
}

impl TimeEnvelope {
    /// Builds an envelope from a UTC date time.
    pub fn from_datetime(date: DateTime<Utc>) -> Self {
        TimeEnvelope {
            seconds: date.timestamp(),
            nanoseconds: date.timestamp_subsec_nanos() as i64,
        }
    }
}

/// Captures the current wall-clock time.
///
/// ```
/// use sping::time::{now, parse};
/// let envelope = now();
/// println!("Sent at {}", parse(Some(&envelope)));
/// ```
pub fn now() -> TimeEnvelope {
    TimeEnvelope::from_datetime(Utc::now())
}

/// Recovers the timestamp held in an envelope.
///
/// An absent envelope, or one outside the representable range, parses to the
/// Unix epoch.
pub fn parse(envelope: Option<&TimeEnvelope>) -> DateTime<Utc> {
    let Some(envelope) = envelope else {
        return DateTime::UNIX_EPOCH;
    };

    let total = envelope.seconds as i128 * NANOS_PER_SECOND + envelope.nanoseconds as i128;
    let secs = total.div_euclid(NANOS_PER_SECOND);
    let nanos = total.rem_euclid(NANOS_PER_SECOND) as u32;

    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, nanos))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Time elapsed between the envelope's timestamp and now.
///
/// Clock steps can put the envelope in the future; that reads as zero.
pub fn elapsed_since(envelope: Option<&TimeEnvelope>) -> Duration {
    (Utc::now() - parse(envelope))
        .to_std()
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recovers_captured_time() {
        let before = Utc::now();
        let envelope = now();
        let after = Utc::now();

        let parsed = parse(Some(&envelope));
        assert!(parsed >= before && parsed <= after);
    }

    #[test]
    fn parse_absent_is_epoch() {
        assert_eq!(parse(None), DateTime::UNIX_EPOCH);
        assert_eq!(parse(None).timestamp(), 0);
    }

    #[test]
    fn parse_normalizes_nanoseconds() {
        // Only nanoseconds set, the way some senders fill the envelope.
        let envelope = TimeEnvelope {
            seconds: 0,
            nanoseconds: 1_525_987_151_000_000,
        };
        let parsed = parse(Some(&envelope));
        assert_eq!(parsed.timestamp(), 1_525_987);
        assert_eq!(parsed.timestamp_subsec_nanos(), 151_000_000);

        let negative = TimeEnvelope {
            seconds: 10,
            nanoseconds: -250_000_000,
        };
        let parsed = parse(Some(&negative));
        assert_eq!(parsed.timestamp(), 9);
        assert_eq!(parsed.timestamp_subsec_nanos(), 750_000_000);
    }

    #[test]
    fn parse_out_of_range_is_epoch() {
        let envelope = TimeEnvelope {
            seconds: i64::MAX,
            nanoseconds: i64::MAX,
        };
        assert_eq!(parse(Some(&envelope)), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn from_datetime_keeps_fields() {
        const TEST_CASES: &[(i64, u32)] = &[(1_525_987, 0), (0, 0), (2_584_229, 25_003_600)];

        for &(secs, nanos) in TEST_CASES {
            let sample = DateTime::<Utc>::from_timestamp(secs, nanos).expect("Invalid timestamp");
            let envelope = TimeEnvelope::from_datetime(sample);
            assert_eq!(envelope.seconds, secs);
            assert_eq!(envelope.nanoseconds, nanos as i64);
            assert_eq!(parse(Some(&envelope)), sample);
        }
    }

    #[test]
    fn elapsed_since_future_is_zero() {
        let future = TimeEnvelope::from_datetime(Utc::now() + chrono::Duration::seconds(60));
        assert_eq!(elapsed_since(Some(&future)), Duration::ZERO);
    }
}
