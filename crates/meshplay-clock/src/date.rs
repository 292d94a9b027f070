//! Start dates shared over the wire.
//!
//! A start date is an absolute wall-clock time, encoded as seconds since
//! the Unix epoch with six fractional digits (`"1700000000.250000"`).
//! Peers rely on their system clocks being roughly in sync; each one
//! converts the date into a local monotonic deadline with
//! [`deadline_instant`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

use crate::ClockError;

/// Formats `date` as seconds since the Unix epoch with microsecond
/// precision. Dates before the epoch format as `"0.000000"`.
pub fn format_start_date(date: SystemTime) -> String {
    let since = date.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    format!("{}.{:06}", since.as_secs(), since.subsec_micros())
}

/// Parses a date produced by [`format_start_date`].
///
/// Any non-negative decimal number of seconds is accepted.
pub fn parse_start_date(text: &str) -> Result<SystemTime, ClockError> {
    let invalid = || ClockError::InvalidStartDate(text.to_string());
    let secs: f64 = text.trim().parse().map_err(|_| invalid())?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(invalid());
    }
    let offset = Duration::try_from_secs_f64(secs).map_err(|_| invalid())?;
    UNIX_EPOCH.checked_add(offset).ok_or_else(invalid)
}

/// Now plus `delay`.
pub fn start_date_after(delay: Duration) -> SystemTime {
    SystemTime::now() + delay
}

/// Converts a wall-clock date into a tokio deadline.
///
/// Dates already in the past map to "now", so a timer armed with the
/// result fires immediately instead of never.
pub fn deadline_instant(date: SystemTime) -> Instant {
    let now = Instant::now();
    match date.duration_since(SystemTime::now()) {
        Ok(ahead) => now + ahead,
        Err(behind) => {
            tracing::debug!(late_by = ?behind.duration(), "start date already passed");
            now
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_start_date_uses_six_decimals() {
        let date = UNIX_EPOCH + Duration::from_millis(1_700_000_000_250);
        assert_eq!(format_start_date(date), "1700000000.250000");
    }

    #[test]
    fn test_format_start_date_before_epoch_is_zero() {
        let date = UNIX_EPOCH - Duration::from_secs(1);
        assert_eq!(format_start_date(date), "0.000000");
    }

    #[test]
    fn test_parse_start_date_round_trips_to_the_microsecond() {
        let date = UNIX_EPOCH + Duration::from_micros(1_700_000_000_123_456);
        let parsed = parse_start_date(&format_start_date(date)).unwrap();
        let diff = parsed
            .duration_since(date)
            .unwrap_or_else(|e| e.duration());
        assert!(diff < Duration::from_micros(2), "diff {diff:?}");
    }

    #[test]
    fn test_parse_start_date_rejects_garbage() {
        for text in ["", "soon", "-1.0", "NaN", "inf"] {
            assert!(
                matches!(parse_start_date(text), Err(ClockError::InvalidStartDate(_))),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_start_date_accepts_integer_seconds() {
        let parsed = parse_start_date("12").unwrap();
        assert_eq!(parsed, UNIX_EPOCH + Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_instant_past_date_is_now() {
        let before = Instant::now();
        let deadline = deadline_instant(UNIX_EPOCH);
        assert_eq!(deadline, before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_instant_future_date_is_ahead() {
        let deadline = deadline_instant(start_date_after(Duration::from_secs(3)));
        let ahead = deadline - Instant::now();
        assert!(ahead > Duration::from_millis(2_900));
        assert!(ahead <= Duration::from_secs(3));
    }
}
