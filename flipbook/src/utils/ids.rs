//! Identifier generation.

use uuid::Uuid;

/// Generates a random (v4) identifier for a pipeline run.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::new_v4()
}

/// Generates a time-ordered (v7) identifier for a batch job.
///
/// Batch ids sort by creation time, which keeps report directories ordered.
#[must_use]
pub fn generate_batch_id() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(generate_run_id(), generate_run_id());
    }

    #[test]
    fn test_batch_id_is_v7() {
        assert_eq!(generate_batch_id().get_version_num(), 7);
    }
}
