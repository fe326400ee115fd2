//! Destination writing: batch upserts with per-record fallback.
//!
//! The `Destination` trait is the seam between the pipeline and the
//! PostgREST backend, so tests can substitute an in-memory fake. The
//! `BatchWriter` buffers transformed records and flushes them in
//! configured batch sizes; when a batch write fails it retries each
//! record individually so one malformed record cannot sink its
//! batch-mates.

pub mod postgrest;

use async_trait::async_trait;
use tracing::warn;

use crate::error::WriteError;
use crate::metrics::events::{BatchFallback, BatchWritten, RecordWriteFailure};
use crate::record::{TransformedRecord, is_empty_value};

pub use postgrest::PostgrestClient;

/// A write target for transformed records.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Upsert a batch of records into a table, resolving conflicts on
    /// the given key columns by merging.
    async fn upsert(
        &self,
        table: &str,
        conflict_key: &[String],
        records: &[TransformedRecord],
    ) -> Result<(), WriteError>;

    /// Exact row count of a table, used for post-run verification.
    async fn count(&self, table: &str) -> Result<u64, WriteError>;
}

/// One record that could not be written even individually.
#[derive(Debug)]
pub struct RecordFailure {
    pub record: TransformedRecord,
    pub error: String,
}

/// Result of flushing buffered records.
#[derive(Debug, Default)]
pub struct FlushOutcome {
    /// Records confirmed written.
    pub written: usize,
    /// Records that failed their individual retry.
    pub failures: Vec<RecordFailure>,
    /// Whether any batch had to fall back to per-record writes.
    pub fell_back: bool,
}

impl FlushOutcome {
    fn merge(&mut self, other: FlushOutcome) {
        self.written += other.written;
        self.failures.extend(other.failures);
        self.fell_back |= other.fell_back;
    }
}

/// Buffers transformed records for one entity and writes them in
/// batches.
pub struct BatchWriter<'a> {
    destination: &'a dyn Destination,
    entity: &'a str,
    table: &'a str,
    conflict_key: &'a [String],
    batch_size: usize,
    buffer: Vec<TransformedRecord>,
}

impl<'a> BatchWriter<'a> {
    pub fn new(
        destination: &'a dyn Destination,
        entity: &'a str,
        table: &'a str,
        conflict_key: &'a [String],
        batch_size: usize,
    ) -> Self {
        Self {
            destination,
            entity,
            table,
            conflict_key,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
        }
    }

    /// Buffer one record, flushing if the buffer reaches the batch size.
    /// Empty fields are stripped before buffering so updates never
    /// overwrite populated destination values with emptiness.
    pub async fn push(&mut self, record: TransformedRecord) -> FlushOutcome {
        self.buffer.push(sparse_payload(record));
        if self.buffer.len() >= self.batch_size {
            self.flush().await
        } else {
            FlushOutcome::default()
        }
    }

    /// Write out all buffered records.
    pub async fn flush(&mut self) -> FlushOutcome {
        let mut outcome = FlushOutcome::default();
        while !self.buffer.is_empty() {
            let take = self.batch_size.min(self.buffer.len());
            let batch: Vec<TransformedRecord> = self.buffer.drain(..take).collect();
            outcome.merge(self.write_batch(batch).await);
        }
        outcome
    }

    async fn write_batch(&self, batch: Vec<TransformedRecord>) -> FlushOutcome {
        match self
            .destination
            .upsert(self.table, self.conflict_key, &batch)
            .await
        {
            Ok(()) => {
                crate::emit!(BatchWritten {
                    entity: self.entity,
                    count: batch.len(),
                });
                FlushOutcome {
                    written: batch.len(),
                    failures: Vec::new(),
                    fell_back: false,
                }
            }
            // Any batch-level failure, destination rejection or timeout
            // alike, degrades to per-record writes. Atomic batch
            // rollback cannot be relied upon, so the record is the unit
            // of failure.
            Err(error) => {
                warn!(
                    entity = self.entity,
                    batch_size = batch.len(),
                    %error,
                    "batch write rejected, retrying records individually"
                );
                crate::emit!(BatchFallback {
                    entity: self.entity,
                    batch_size: batch.len(),
                });
                self.write_individually(batch).await
            }
        }
    }

    async fn write_individually(&self, batch: Vec<TransformedRecord>) -> FlushOutcome {
        let mut outcome = FlushOutcome {
            fell_back: true,
            ..Default::default()
        };
        for record in batch {
            match self
                .destination
                .upsert(self.table, self.conflict_key, std::slice::from_ref(&record))
                .await
            {
                Ok(()) => outcome.written += 1,
                Err(error) => {
                    crate::emit!(RecordWriteFailure {
                        entity: self.entity,
                    });
                    outcome.failures.push(RecordFailure {
                        record,
                        error: error.to_string(),
                    });
                }
            }
        }
        outcome
    }
}

/// Strip null and empty-string fields from a write payload.
pub fn sparse_payload(record: TransformedRecord) -> TransformedRecord {
    record
        .into_iter()
        .filter(|(_, value)| !is_empty_value(value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RejectedSnafu;
    use serde_json::json;
    use snafu::prelude::*;
    use std::sync::Mutex;

    /// Rejects any batch containing a record whose "name" equals the
    /// poison marker; individual writes of clean records succeed.
    struct PoisonDestination {
        poison: &'static str,
        written: Mutex<Vec<TransformedRecord>>,
        calls: Mutex<usize>,
    }

    impl PoisonDestination {
        fn new(poison: &'static str) -> Self {
            Self {
                poison,
                written: Mutex::new(Vec::new()),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Destination for PoisonDestination {
        async fn upsert(
            &self,
            _table: &str,
            _conflict_key: &[String],
            records: &[TransformedRecord],
        ) -> Result<(), WriteError> {
            *self.calls.lock().unwrap() += 1;
            let poisoned = records
                .iter()
                .any(|r| r.get("name").and_then(|v| v.as_str()) == Some(self.poison));
            ensure!(
                !poisoned,
                RejectedSnafu {
                    status: 400u16,
                    body: "invalid input syntax".to_string()
                }
            );
            self.written.lock().unwrap().extend(records.iter().cloned());
            Ok(())
        }

        async fn count(&self, _table: &str) -> Result<u64, WriteError> {
            Ok(self.written.lock().unwrap().len() as u64)
        }
    }

    fn record(name: &str) -> TransformedRecord {
        let mut r = TransformedRecord::new();
        r.insert("name".to_string(), json!(name));
        r
    }

    fn key() -> Vec<String> {
        vec!["name".to_string()]
    }

    #[tokio::test]
    async fn test_clean_batch_writes_once() {
        let dest = PoisonDestination::new("never");
        let conflict = key();
        let mut writer = BatchWriter::new(&dest, "things", "things", &conflict, 10);

        let mut outcome = FlushOutcome::default();
        for i in 0..4 {
            outcome.merge(writer.push(record(&format!("r{i}"))).await);
        }
        outcome.merge(writer.flush().await);

        assert_eq!(outcome.written, 4);
        assert!(outcome.failures.is_empty());
        assert!(!outcome.fell_back);
        assert_eq!(*dest.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_poison_record_isolated() {
        let dest = PoisonDestination::new("r5");
        let conflict = key();
        let mut writer = BatchWriter::new(&dest, "things", "things", &conflict, 10);

        let mut outcome = FlushOutcome::default();
        for i in 0..10 {
            outcome.merge(writer.push(record(&format!("r{i}"))).await);
        }
        outcome.merge(writer.flush().await);

        // Nine batch-mates land, only the poison record fails
        assert_eq!(outcome.written, 9);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.fell_back);
        assert_eq!(outcome.failures[0].record["name"], json!("r5"));
        assert!(outcome.failures[0].error.contains("400"));
        // 1 batch attempt + 10 individual retries
        assert_eq!(*dest.calls.lock().unwrap(), 11);
    }

    #[tokio::test]
    async fn test_push_flushes_at_batch_size() {
        let dest = PoisonDestination::new("never");
        let conflict = key();
        let mut writer = BatchWriter::new(&dest, "things", "things", &conflict, 2);

        assert_eq!(writer.push(record("a")).await.written, 0);
        assert_eq!(writer.push(record("b")).await.written, 2);
        assert_eq!(writer.flush().await.written, 0);
    }

    #[test]
    fn test_sparse_payload_strips_empty() {
        let mut r = TransformedRecord::new();
        r.insert("a".to_string(), json!("x"));
        r.insert("b".to_string(), json!(""));
        r.insert("c".to_string(), serde_json::Value::Null);
        r.insert("d".to_string(), json!(0));

        let sparse = sparse_payload(r);
        assert_eq!(sparse.len(), 2);
        assert!(sparse.contains_key("a"));
        assert!(sparse.contains_key("d"));
    }
}
