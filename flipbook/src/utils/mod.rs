//! Utility functions for identifiers and timestamp handling.

mod ids;
pub mod timestamps;

pub use ids::{generate_batch_id, generate_run_id};
pub use timestamps::{duration_ms, iso_timestamp, now_utc, Timestamp};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_run_id_is_valid() {
        let id = generate_run_id();
        assert_eq!(id.get_version_num(), 4);
    }

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        // RFC3339 with microseconds: YYYY-MM-DDTHH:MM:SS.ffffff+00:00
        assert!(ts.contains('T'));
        assert!(ts.ends_with("+00:00"));
    }
}
