//! Timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used on runs, artifacts, and events.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an ISO 8601 string with microseconds.
///
/// # Examples
///
/// ```
/// use flipbook::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Milliseconds between two timestamps, clamped at zero.
#[must_use]
pub fn duration_ms(start: Timestamp, end: Timestamp) -> u64 {
    u64::try_from((end - start).num_milliseconds()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_duration_ms() {
        let start = now_utc();
        let end = start + Duration::milliseconds(250);
        assert_eq!(duration_ms(start, end), 250);
    }

    #[test]
    fn test_duration_ms_clamps_negative() {
        let start = now_utc();
        let end = start - Duration::seconds(1);
        assert_eq!(duration_ms(start, end), 0);
    }
}
