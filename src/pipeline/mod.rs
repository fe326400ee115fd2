//! Main sync pipeline.
//!
//! Connects sources, the transformer, and the destination into one run:
//! every configured entity syncs on its own tokio task, sharing the
//! destination client, run report, and dead letter queue. Shutdown is
//! cooperative and checked between pages, so an interrupted run still
//! flushes what it buffered and persists a summary.

mod signal;

use snafu::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, EntityConfig};
use crate::dlq::{DeadLetterQueue, FailedRecord};
use crate::emit;
use crate::error::{DlqSnafu, SyncError, TaskJoinSnafu};
use crate::metrics::events::{EntitySynced, RecordRejected, RecordsRead, RecordsTransformed};
use crate::report::{EntityStatus, RunReport, RunSummary, persist};
use crate::sink::{BatchWriter, Destination, FlushOutcome, PostgrestClient};
use crate::source::SourceReader;
use crate::transform::{TransformOutcome, mappings, transform};

/// Run a full sync: all entities, verification, summary persistence.
/// Installs the shutdown signal handler.
pub async fn run_pipeline(config: Config) -> Result<RunSummary, SyncError> {
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            signal::shutdown_signal().await;
            shutdown.cancel();
        }
    });

    run_sync(config, shutdown).await
}

/// Run a full sync with an externally controlled shutdown token.
pub async fn run_sync(
    config: Config,
    shutdown: CancellationToken,
) -> Result<RunSummary, SyncError> {
    let destination: Arc<dyn Destination> = Arc::new(
        PostgrestClient::new(&config.destination).context(crate::error::DestinationSnafu)?,
    );
    let dlq = DeadLetterQueue::from_config(&config.error_handling)
        .context(DlqSnafu)?
        .map(Arc::new);
    let report = Arc::new(RunReport::new());

    info!(run_id = report.run_id(), entities = config.entities.len(), "starting sync run");

    let mut tasks = JoinSet::new();
    for entity in config.entities.clone() {
        let destination = destination.clone();
        let report = report.clone();
        let dlq = dlq.clone();
        let shutdown = shutdown.clone();
        let max_failures = config.error_handling.max_record_failures;
        tasks.spawn(async move {
            sync_entity(entity, &*destination, &report, dlq.as_deref(), max_failures, &shutdown)
                .await;
        });
    }

    while let Some(joined) = tasks.join_next().await {
        joined.context(TaskJoinSnafu)?;
    }

    if config.report.verify {
        verify_counts(&config, &*destination, &report).await;
    }

    if let Some(dlq) = &dlq
        && let Err(e) = dlq.finalize().await
    {
        report
            .add_error(format!("failed to write dead letter queue: {e}"))
            .await;
    }

    let summary = report.finalize().await;
    persist(&summary, &config.report.path).await;

    info!(
        run_id = %summary.run_id,
        success = summary.success,
        written = summary.total_written(),
        "sync run finished"
    );
    Ok(summary)
}

/// Sync one entity end to end. Failures are recorded in the report
/// rather than returned, so one entity cannot take down its siblings.
async fn sync_entity(
    entity: EntityConfig,
    destination: &dyn Destination,
    report: &RunReport,
    dlq: Option<&DeadLetterQueue>,
    max_failures: usize,
    shutdown: &CancellationToken,
) {
    let started = Instant::now();
    info!(entity = %entity.name, table = %entity.table, "syncing entity");

    let mut reader = match crate::source::open(&entity.source) {
        Ok(reader) => reader,
        Err(e) => {
            report
                .add_error(format!("{}: source unavailable: {e}", entity.name))
                .await;
            report.set_status(&entity.name, EntityStatus::Failed).await;
            emit!(EntitySynced {
                entity: &entity.name,
                status: "failed",
                duration: started.elapsed(),
            });
            return;
        }
    };
    debug!(entity = %entity.name, source = %reader.describe(), "source opened");

    let status = match sync_records(
        &entity,
        reader.as_mut(),
        destination,
        report,
        dlq,
        max_failures,
        shutdown,
    )
    .await
    {
        Ok(status) => status,
        Err(e) => {
            report.add_error(format!("{}: {e}", entity.name)).await;
            EntityStatus::Failed
        }
    };

    report.set_status(&entity.name, status).await;
    emit!(EntitySynced {
        entity: &entity.name,
        status: match status {
            EntityStatus::Completed => "completed",
            EntityStatus::Failed => "failed",
        },
        duration: started.elapsed(),
    });
}

/// Drive one entity's read-transform-write loop to completion.
///
/// Public so integration tests can run the loop against in-memory
/// sources and destinations.
pub async fn sync_records(
    entity: &EntityConfig,
    reader: &mut dyn SourceReader,
    destination: &dyn Destination,
    report: &RunReport,
    dlq: Option<&DeadLetterQueue>,
    max_failures: usize,
    shutdown: &CancellationToken,
) -> Result<EntityStatus, SyncError> {
    // Config validation rejects unknown mappings before a run starts
    let Some(mapping) = mappings::lookup(&entity.mapping) else {
        return Err(SyncError::Config {
            source: crate::error::ConfigError::UnknownMapping {
                entity: entity.name.clone(),
                mapping: entity.mapping.clone(),
            },
        });
    };

    let mut writer = BatchWriter::new(
        destination,
        &entity.name,
        &entity.table,
        &entity.conflict_key,
        entity.batch_size,
    );
    let mut read_total = 0usize;
    let mut failures_total = 0usize;
    let mut interrupted = false;

    loop {
        if shutdown.is_cancelled() {
            warn!(entity = %entity.name, "shutdown requested, stopping early");
            interrupted = true;
            break;
        }

        if let Some(limit) = entity.row_limit
            && read_total >= limit
        {
            debug!(entity = %entity.name, limit, "row limit reached");
            break;
        }

        let page = reader
            .next_page()
            .await
            .with_context(|_| crate::error::SourceSnafu {
                entity: entity.name.clone(),
            })?;
        let Some(mut page) = page else { break };

        if let Some(limit) = entity.row_limit {
            page.truncate(limit.saturating_sub(read_total));
        }
        if page.is_empty() {
            // A paginated source may serve an empty page mid-stream;
            // only `next_page` returning `None` marks exhaustion.
            continue;
        }

        read_total += page.len();
        report.add_read(&entity.name, page.len()).await;
        emit!(RecordsRead {
            entity: &entity.name,
            count: page.len(),
        });

        let mut transformed = 0usize;
        for raw in &page {
            match transform(raw, mapping, &entity.conflict_key) {
                TransformOutcome::Record { record, warnings } => {
                    transformed += 1;
                    for warning in warnings {
                        report
                            .add_warning(format!("{}: {warning}", entity.name))
                            .await;
                    }
                    let outcome = writer.push(record).await;
                    failures_total += handle_flush(entity, outcome, report, dlq).await;
                }
                TransformOutcome::Rejected { reason } => {
                    debug!(entity = %entity.name, %reason, "record rejected");
                    report.add_rejected(&entity.name, 1).await;
                    emit!(RecordRejected {
                        entity: &entity.name,
                        reason: &reason,
                    });
                }
            }
            if max_failures > 0 && failures_total > max_failures {
                return Err(SyncError::MaxFailuresExceeded {
                    entity: entity.name.clone(),
                    max: max_failures,
                });
            }
        }
        report.add_transformed(&entity.name, transformed).await;
        emit!(RecordsTransformed {
            entity: &entity.name,
            count: transformed,
        });
    }

    let outcome = writer.flush().await;
    handle_flush(entity, outcome, report, dlq).await;

    if interrupted {
        report
            .add_warning(format!("{}: interrupted by shutdown", entity.name))
            .await;
        return Ok(EntityStatus::Failed);
    }
    Ok(EntityStatus::Completed)
}

/// Fold one flush outcome into the report and DLQ. Returns the number
/// of record failures it contained.
async fn handle_flush(
    entity: &EntityConfig,
    outcome: FlushOutcome,
    report: &RunReport,
    dlq: Option<&DeadLetterQueue>,
) -> usize {
    if outcome.written > 0 {
        report.add_written(&entity.name, outcome.written).await;
    }
    let failures = outcome.failures.len();
    if failures > 0 {
        report.add_failed(&entity.name, failures).await;
        for failure in outcome.failures {
            report
                .add_warning(format!(
                    "{}: record failed to write: {}",
                    entity.name, failure.error
                ))
                .await;
            if let Some(dlq) = dlq {
                dlq.push(FailedRecord::new(&entity.name, failure.record, failure.error))
                    .await;
            }
        }
    }
    failures
}

/// Cross-check destination row counts after the run. Advisory: count
/// failures and mismatches become warnings, never errors.
async fn verify_counts(config: &Config, destination: &dyn Destination, report: &RunReport) {
    for entity in &config.entities {
        match destination.count(&entity.table).await {
            Ok(rows) => {
                info!(
                    entity = %entity.name,
                    table = %entity.table,
                    rows,
                    "destination row count"
                );
                report.set_destination_rows(&entity.name, rows).await;
            }
            Err(e) => {
                report
                    .add_warning(format!(
                        "{}: could not verify destination count: {e}",
                        entity.name
                    ))
                    .await;
            }
        }
    }
}
