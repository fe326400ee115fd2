//! Error types for kraftsync using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Destination URL is empty.
    #[snafu(display("Destination URL cannot be empty"))]
    EmptyDestinationUrl,

    /// No entities configured.
    #[snafu(display("At least one entity must be configured"))]
    NoEntities,

    /// Entity references a mapping that does not exist.
    #[snafu(display("Entity '{entity}' references unknown mapping '{mapping}'"))]
    UnknownMapping { entity: String, mapping: String },

    /// Entity has a zero batch size.
    #[snafu(display("Entity '{entity}' has a zero batch size"))]
    ZeroBatchSize { entity: String },

    /// Entity has an empty conflict key.
    #[snafu(display("Entity '{entity}' has an empty conflict key"))]
    EmptyConflictKey { entity: String },

    /// CSV delimiter is not a single-byte character.
    #[snafu(display("Entity '{entity}' has a non-ASCII CSV delimiter"))]
    BadDelimiter { entity: String },
}

// ============ Source Errors ============

/// Errors that can occur while reading raw records from a source.
///
/// Any of these aborts the affected entity's sync; pages are never
/// retried inside the reader.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// Source file could not be opened.
    #[snafu(display("Failed to open source file {path}"))]
    FileOpen {
        path: String,
        source: std::io::Error,
    },

    /// CSV parsing failed.
    #[snafu(display("CSV error in {path}"))]
    Csv { path: String, source: csv::Error },

    /// SQLite query failed.
    #[snafu(display("SQLite query failed"))]
    Sqlite { source: rusqlite::Error },

    /// HTTP transport failure talking to a remote source.
    #[snafu(display("Source HTTP request failed"))]
    Http { source: reqwest::Error },

    /// Remote source returned a non-2xx response.
    #[snafu(display("Source API returned {status}: {body}"))]
    Api { status: u16, body: String },
}

// ============ Write Errors ============

/// Errors that can occur while writing batches to the destination.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WriteError {
    /// HTTP transport failure (includes timeouts).
    #[snafu(display("Destination request failed"))]
    Transport { source: reqwest::Error },

    /// Destination rejected the write.
    #[snafu(display("Destination returned {status}: {body}"))]
    Rejected { status: u16, body: String },

    /// Destination count response was missing or malformed.
    #[snafu(display("Destination count unavailable: {message}"))]
    CountUnavailable { message: String },

    /// Destination client could not be built.
    #[snafu(display("Failed to build destination HTTP client"))]
    ClientBuild { source: reqwest::Error },
}

// ============ DLQ Errors ============

/// Errors that can occur during dead letter queue operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
// Prefix is intentional to avoid snafu selector conflicts (e.g., WriteSnafu)
#[allow(clippy::enum_variant_names)]
pub enum DlqError {
    /// Failed to create the DLQ directory.
    #[snafu(display("Failed to create DLQ directory {path}"))]
    DlqCreateDir {
        path: String,
        source: std::io::Error,
    },

    /// Failed to write to the DLQ file.
    #[snafu(display("Failed to write to DLQ"))]
    DlqWrite { source: std::io::Error },

    /// Failed to serialize a failed record.
    #[snafu(display("Failed to serialize DLQ record"))]
    DlqSerialize { source: serde_json::Error },
}

// ============ Report Errors ============

/// Errors that can occur while persisting the run summary.
///
/// These are always logged and swallowed; a failure to persist the
/// summary never aborts a run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReportError {
    /// Failed to serialize the run summary.
    #[snafu(display("Failed to serialize run summary"))]
    SummarySerialize { source: serde_json::Error },

    /// Failed to write the summary file.
    #[snafu(display("Failed to write summary file {path}"))]
    SummaryWrite {
        path: String,
        source: std::io::Error,
    },
}

// ============ Sync Error (top-level) ============

/// Top-level errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SyncError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// An entity's source was unavailable.
    #[snafu(display("Source unavailable for entity '{entity}'"))]
    Source {
        entity: String,
        source: SourceError,
    },

    /// Destination client could not be constructed.
    #[snafu(display("Destination error"))]
    Destination { source: WriteError },

    /// DLQ error during setup.
    #[snafu(display("DLQ error"))]
    Dlq { source: DlqError },

    /// Record failure count exceeded the configured ceiling.
    #[snafu(display("Entity '{entity}' exceeded {max} record failures"))]
    MaxFailuresExceeded { entity: String, max: usize },

    /// Task join error.
    #[snafu(display("Task join error"))]
    TaskJoin { source: tokio::task::JoinError },

    /// The run finished with at least one failed entity.
    #[snafu(display("Run failed with {count} error(s); see summary for details"))]
    RunFailed { count: usize },
}
