//! Repository implementations for the persisted entities

pub mod feedback;
pub mod runs;
pub mod weights;

pub use feedback::FeedbackRepository;
pub use runs::{RunRepository, StoredRun};
pub use weights::WeightRepository;

use chrono::{DateTime, Utc};

use crate::{Error, Result};

pub(crate) fn parse_timestamp(table: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::corrupt(table, format!("bad timestamp '{}': {}", value, e)))
}
