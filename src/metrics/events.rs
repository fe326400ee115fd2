use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

use super::InternalEvent;

pub struct RecordsRead<'a> {
    pub entity: &'a str,
    pub count: usize,
}

impl InternalEvent for RecordsRead<'_> {
    fn emit(self) {
        trace!(entity = self.entity, count = self.count, "records read");
        counter!("sync_records_read_total", "entity" => self.entity.to_string())
            .increment(self.count as u64);
    }
}

pub struct RecordsTransformed<'a> {
    pub entity: &'a str,
    pub count: usize,
}

impl InternalEvent for RecordsTransformed<'_> {
    fn emit(self) {
        counter!("sync_records_transformed_total", "entity" => self.entity.to_string())
            .increment(self.count as u64);
    }
}

pub struct RecordRejected<'a> {
    pub entity: &'a str,
    pub reason: &'a str,
}

impl InternalEvent for RecordRejected<'_> {
    fn emit(self) {
        trace!(entity = self.entity, reason = self.reason, "record rejected");
        counter!("sync_records_rejected_total", "entity" => self.entity.to_string())
            .increment(1);
    }
}

pub struct BatchWritten<'a> {
    pub entity: &'a str,
    pub count: usize,
}

impl InternalEvent for BatchWritten<'_> {
    fn emit(self) {
        trace!(entity = self.entity, count = self.count, "batch written");
        counter!("sync_records_written_total", "entity" => self.entity.to_string())
            .increment(self.count as u64);
        counter!("sync_batches_written_total", "entity" => self.entity.to_string())
            .increment(1);
    }
}

pub struct BatchFallback<'a> {
    pub entity: &'a str,
    pub batch_size: usize,
}

impl InternalEvent for BatchFallback<'_> {
    fn emit(self) {
        counter!("sync_batch_fallbacks_total", "entity" => self.entity.to_string())
            .increment(1);
        counter!("sync_fallback_records_total", "entity" => self.entity.to_string())
            .increment(self.batch_size as u64);
    }
}

pub struct RecordWriteFailure<'a> {
    pub entity: &'a str,
}

impl InternalEvent for RecordWriteFailure<'_> {
    fn emit(self) {
        counter!("sync_record_write_failures_total", "entity" => self.entity.to_string())
            .increment(1);
    }
}

pub struct EntitySynced<'a> {
    pub entity: &'a str,
    pub status: &'static str,
    pub duration: Duration,
}

impl InternalEvent for EntitySynced<'_> {
    fn emit(self) {
        counter!(
            "sync_entities_total",
            "entity" => self.entity.to_string(),
            "status" => self.status
        )
        .increment(1);
        histogram!("sync_entity_duration_seconds", "entity" => self.entity.to_string())
            .record(self.duration.as_secs_f64());
    }
}
