//! Run reporting: per-entity counters and the persisted summary.
//!
//! Every run produces a `RunSummary` that is both returned to the
//! caller and written to a well-known JSON file, overwritten each run,
//! so operators and scheduled-job monitors can inspect the latest
//! outcome without trawling logs. Counters only ever increase during a
//! run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::error;

use crate::error::{ReportError, SummarySerializeSnafu, SummaryWriteSnafu};

/// Terminal status of one entity's sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    /// All records accounted for; rejected and failed may be non-zero.
    Completed,
    /// The entity aborted partway (source or transport failure).
    Failed,
}

/// Counters for one entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityCounts {
    /// Raw records read from the source.
    pub read: usize,
    /// Records that passed transformation.
    pub transformed: usize,
    /// Records rejected by validation.
    pub rejected: usize,
    /// Records confirmed written to the destination.
    pub written: usize,
    /// Records that failed their individual write.
    pub failed: usize,
    /// Destination row count after the run, when verification ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_rows: Option<u64>,
}

impl EntityCounts {
    /// Destination coverage relative to records read, in percent.
    /// `None` until verification has run or when nothing was read.
    pub fn coverage_percent(&self) -> Option<f64> {
        let rows = self.destination_rows?;
        if self.read == 0 {
            return None;
        }
        Some(rows as f64 / self.read as f64 * 100.0)
    }
}

/// The persisted result of one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub entities: BTreeMap<String, EntityCounts>,
    pub statuses: BTreeMap<String, EntityStatus>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl RunSummary {
    /// Total records written across all entities.
    pub fn total_written(&self) -> usize {
        self.entities.values().map(|c| c.written).sum()
    }
}

struct ReportState {
    entities: BTreeMap<String, EntityCounts>,
    statuses: BTreeMap<String, EntityStatus>,
    errors: Vec<String>,
    warnings: Vec<String>,
}

/// Collects counters and messages from entity tasks during a run.
pub struct RunReport {
    run_id: String,
    started_at: DateTime<Utc>,
    state: Mutex<ReportState>,
}

impl RunReport {
    pub fn new() -> Self {
        let started_at = Utc::now();
        Self {
            run_id: format!("{}-kraftsync", started_at.format("%Y%m%d-%H%M%S")),
            started_at,
            state: Mutex::new(ReportState {
                entities: BTreeMap::new(),
                statuses: BTreeMap::new(),
                errors: Vec::new(),
                warnings: Vec::new(),
            }),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn add_read(&self, entity: &str, count: usize) {
        self.with_counts(entity, |c| c.read += count).await;
    }

    pub async fn add_transformed(&self, entity: &str, count: usize) {
        self.with_counts(entity, |c| c.transformed += count).await;
    }

    pub async fn add_rejected(&self, entity: &str, count: usize) {
        self.with_counts(entity, |c| c.rejected += count).await;
    }

    pub async fn add_written(&self, entity: &str, count: usize) {
        self.with_counts(entity, |c| c.written += count).await;
    }

    pub async fn add_failed(&self, entity: &str, count: usize) {
        self.with_counts(entity, |c| c.failed += count).await;
    }

    pub async fn set_destination_rows(&self, entity: &str, rows: u64) {
        self.with_counts(entity, |c| c.destination_rows = Some(rows))
            .await;
    }

    pub async fn set_status(&self, entity: &str, status: EntityStatus) {
        self.state
            .lock()
            .await
            .statuses
            .insert(entity.to_string(), status);
    }

    pub async fn add_error(&self, message: impl Into<String>) {
        self.state.lock().await.errors.push(message.into());
    }

    pub async fn add_warning(&self, message: impl Into<String>) {
        self.state.lock().await.warnings.push(message.into());
    }

    async fn with_counts(&self, entity: &str, f: impl FnOnce(&mut EntityCounts)) {
        let mut state = self.state.lock().await;
        f(state.entities.entry(entity.to_string()).or_default());
    }

    /// Freeze the report into a summary. A run succeeds when no errors
    /// were recorded and every entity completed.
    pub async fn finalize(&self) -> RunSummary {
        let state = self.state.lock().await;
        let success = state.errors.is_empty()
            && state
                .statuses
                .values()
                .all(|s| *s == EntityStatus::Completed);
        RunSummary {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            success,
            entities: state.entities.clone(),
            statuses: state.statuses.clone(),
            errors: state.errors.clone(),
            warnings: state.warnings.clone(),
        }
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Persist the summary JSON, overwriting the previous run's file. A
/// persist failure is logged, never fatal: the sync itself already
/// happened.
pub async fn persist(summary: &RunSummary, path: impl AsRef<Path>) {
    if let Err(e) = try_persist(summary, path.as_ref()).await {
        error!(error = %snafu::Report::from_error(e), "failed to persist run summary");
    }
}

async fn try_persist(summary: &RunSummary, path: &Path) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(summary).context(SummarySerializeSnafu)?;
    tokio::fs::write(path, json)
        .await
        .context(SummaryWriteSnafu {
            path: path.display().to_string(),
        })
}
