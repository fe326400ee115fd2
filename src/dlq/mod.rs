//! Dead letter queue for records that failed their individual write.
//!
//! Failed records are buffered in memory during the run and flushed to
//! a timestamped NDJSON file at the end, so a partially-failed sync
//! leaves behind everything needed to replay just the failures.

mod queue;
mod types;

pub use queue::DeadLetterQueue;
pub use types::FailedRecord;
