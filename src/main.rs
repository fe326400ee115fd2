//! kraftsync command line entry point.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kraftsync::config::{Config, SourceConfig};
use kraftsync::error::{ConfigSnafu, RunFailedSnafu, SyncError};
use kraftsync::run_pipeline;

/// Sync energy datasets into a PostgREST backend.
#[derive(Parser, Debug)]
#[command(name = "kraftsync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration without syncing.
    #[arg(long)]
    dry_run: bool,

    /// Sync only the named entities (repeatable).
    #[arg(long = "entity")]
    entities: Vec<String>,

    /// Cap the number of records read per entity.
    #[arg(long)]
    limit: Option<usize>,

    /// Verify destination row counts after the run.
    #[arg(long)]
    verify: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), SyncError> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("kraftsync starting");

    let config = build_config(&args)?;

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Destination: {}", config.destination.url);
        info!("Report file: {}", config.report.path);
        for entity in &config.entities {
            let source = match &entity.source {
                SourceConfig::Csv { path, .. } => format!("csv {path}"),
                SourceConfig::Sqlite { path, .. } => format!("sqlite {path}"),
                SourceConfig::Notion { database_id, .. } => format!("notion {database_id}"),
            };
            info!("  - {} -> {} ({})", entity.name, entity.table, source);
        }
        info!("Configuration is valid");
        return Ok(());
    }

    let summary = run_pipeline(config).await?;

    info!("Sync run {} finished", summary.run_id);
    for (name, counts) in &summary.entities {
        info!(
            "  {}: read={} transformed={} rejected={} written={} failed={}",
            name, counts.read, counts.transformed, counts.rejected, counts.written, counts.failed
        );
        if let Some(pct) = counts.coverage_percent() {
            info!("    destination coverage: {pct:.1}%");
        }
    }
    for warning in &summary.warnings {
        info!("  warning: {warning}");
    }

    ensure!(
        summary.success,
        RunFailedSnafu {
            count: summary.errors.len()
        }
    );
    Ok(())
}

/// Build configuration from arguments, applying entity filters and the
/// per-entity record cap.
fn build_config(args: &Args) -> Result<Config, SyncError> {
    let mut config = Config::from_file(&args.config).context(ConfigSnafu)?;

    if !args.entities.is_empty() {
        config
            .entities
            .retain(|entity| args.entities.contains(&entity.name));
        if config.entities.is_empty() {
            return Err(SyncError::Config {
                source: kraftsync::error::ConfigError::NoEntities,
            });
        }
    }
    if let Some(limit) = args.limit {
        for entity in &mut config.entities {
            entity.row_limit = Some(entity.row_limit.map_or(limit, |r| r.min(limit)));
        }
    }
    if args.verify {
        config.report.verify = true;
    }
    Ok(config)
}
