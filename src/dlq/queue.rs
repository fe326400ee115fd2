use chrono::Utc;
use snafu::prelude::*;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

use super::types::FailedRecord;
use crate::config::ErrorHandlingConfig;
use crate::error::{DlqCreateDirSnafu, DlqError, DlqSerializeSnafu, DlqWriteSnafu};

/// In-memory buffer of failed records, flushed to one NDJSON file per
/// run. Shared across entity tasks.
pub struct DeadLetterQueue {
    dir: PathBuf,
    buffer: Mutex<Vec<FailedRecord>>,
}

impl DeadLetterQueue {
    /// Build a queue from config; `None` when no DLQ path is set.
    pub fn from_config(config: &ErrorHandlingConfig) -> Result<Option<Self>, DlqError> {
        match &config.dlq_path {
            Some(path) => Self::new(path).map(Some),
            None => Ok(None),
        }
    }

    pub fn new(dir: impl AsRef<Path>) -> Result<Self, DlqError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).context(DlqCreateDirSnafu {
            path: dir.display().to_string(),
        })?;
        Ok(Self {
            dir,
            buffer: Mutex::new(Vec::new()),
        })
    }

    pub async fn push(&self, record: FailedRecord) {
        self.buffer.lock().await.push(record);
    }

    pub async fn len(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Write all buffered records to a timestamped NDJSON file and
    /// return its path. No file is created when nothing failed.
    pub async fn finalize(&self) -> Result<Option<PathBuf>, DlqError> {
        let buffer = self.buffer.lock().await;
        if buffer.is_empty() {
            return Ok(None);
        }

        let filename = format!("failures-{}.ndjson", Utc::now().format("%Y%m%d-%H%M%S"));
        let path = self.dir.join(filename);

        let mut lines = String::new();
        for record in buffer.iter() {
            let line = serde_json::to_string(record).context(DlqSerializeSnafu)?;
            lines.push_str(&line);
            lines.push('\n');
        }
        tokio::fs::write(&path, lines).await.context(DlqWriteSnafu)?;

        info!(
            path = %path.display(),
            records = buffer.len(),
            "wrote failed records to dead letter queue"
        );
        Ok(Some(path))
    }
}
