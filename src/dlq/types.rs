use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::TransformedRecord;

/// One record that could not be written, with enough context to replay
/// it after the underlying problem is fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRecord {
    /// Entity the record belongs to.
    pub entity: String,
    /// The transformed record as it was sent to the destination.
    pub record: TransformedRecord,
    /// The destination's rejection message.
    pub error: String,
    /// When the failure happened.
    pub failed_at: DateTime<Utc>,
}

impl FailedRecord {
    pub fn new(entity: &str, record: TransformedRecord, error: String) -> Self {
        Self {
            entity: entity.to_string(),
            record,
            error,
            failed_at: Utc::now(),
        }
    }
}
