//! Configuration parsing and validation.
//!
//! Handles loading configuration from YAML files with environment
//! variable interpolation, so credentials reach the pipeline as plain
//! config values and nothing reads the process environment directly.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::path::Path;

use crate::error::{
    BadDelimiterSnafu, ConfigError, EmptyConflictKeySnafu, EmptyDestinationUrlSnafu,
    EnvInterpolationSnafu, NoEntitiesSnafu, ReadFileSnafu, UnknownMappingSnafu, YamlParseSnafu,
    ZeroBatchSizeSnafu,
};
use crate::transform::mappings;

/// Main configuration structure for a sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub destination: DestinationConfig,
    /// Run report configuration (optional).
    #[serde(default)]
    pub report: ReportConfig,
    /// Error handling configuration (optional).
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
    /// Entity types to sync, each with its own source and table.
    pub entities: Vec<EntityConfig>,
}

/// Destination (PostgREST) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Base URL of the Supabase project, e.g. "https://xyz.supabase.co".
    pub url: String,
    /// Service key used for both the `apikey` and bearer headers.
    pub api_key: String,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Run report configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Path of the summary JSON file, overwritten each run.
    #[serde(default = "default_status_path")]
    pub path: String,
    /// Cross-check destination row counts against source read counts
    /// after the run (advisory only).
    #[serde(default)]
    pub verify: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: default_status_path(),
            verify: false,
        }
    }
}

fn default_status_path() -> String {
    "last_sync_status.json".to_string()
}

/// Error handling configuration for resilient pipeline execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    /// Directory to write failed record files (required for DLQ).
    #[serde(default)]
    pub dlq_path: Option<String>,
    /// Maximum record write failures per entity before aborting it
    /// (0 = unlimited, default: 0).
    #[serde(default)]
    pub max_record_failures: usize,
}

/// Configuration for one logical entity type being synced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Entity name used in logs, counters, and the run summary.
    pub name: String,
    /// Destination table name.
    pub table: String,
    /// Name of the built-in field mapping to apply.
    pub mapping: String,
    /// Destination columns whose combined value resolves upsert conflicts.
    pub conflict_key: Vec<String>,
    /// Records per destination write (default: 500).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Truncate the source sequence at this many records (dry runs).
    #[serde(default)]
    pub row_limit: Option<usize>,
    pub source: SourceConfig,
}

fn default_batch_size() -> usize {
    500
}

/// Source connector configuration, tagged by source kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Delimited text file with a header row.
    Csv {
        path: String,
        /// Field delimiter (default: ',').
        #[serde(default = "default_delimiter")]
        delimiter: char,
        /// Rows per page served to the pipeline (default: 1000).
        #[serde(default = "default_page_size")]
        page_size: usize,
    },
    /// Local file-backed SQLite database with a fixed query.
    Sqlite {
        path: String,
        query: String,
        /// Rows per bounded fetch (default: 1000).
        #[serde(default = "default_page_size")]
        page_size: usize,
    },
    /// Notion database queried through the paginated JSON API.
    Notion {
        database_id: String,
        api_key: String,
        /// Page size requested per query (default, and Notion max: 100).
        #[serde(default = "default_notion_page_size")]
        page_size: usize,
        #[serde(default = "default_notion_api_url")]
        api_url: String,
    },
}

fn default_delimiter() -> char {
    ','
}

fn default_page_size() -> usize {
    1000
}

fn default_notion_page_size() -> usize {
    100
}

fn default_notion_api_url() -> String {
    "https://api.notion.com/v1".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_options(path, true)
    }

    /// Load configuration from a YAML file with optional environment variable interpolation.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        interpolate_env: bool,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;

        let content = if interpolate_env {
            let result = vars::interpolate(&content);
            if !result.is_ok() {
                let error_msg = result.errors.join("\n");
                return EnvInterpolationSnafu { message: error_msg }.fail();
            }
            result.text
        } else {
            content
        };

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.destination.url.is_empty(), EmptyDestinationUrlSnafu);
        ensure!(!self.entities.is_empty(), NoEntitiesSnafu);

        for entity in &self.entities {
            ensure!(
                entity.batch_size > 0,
                ZeroBatchSizeSnafu {
                    entity: entity.name.clone()
                }
            );
            ensure!(
                !entity.conflict_key.is_empty(),
                EmptyConflictKeySnafu {
                    entity: entity.name.clone()
                }
            );
            ensure!(
                mappings::lookup(&entity.mapping).is_some(),
                UnknownMappingSnafu {
                    entity: entity.name.clone(),
                    mapping: entity.mapping.clone()
                }
            );
            if let SourceConfig::Csv { delimiter, .. } = &entity.source {
                ensure!(
                    delimiter.is_ascii(),
                    BadDelimiterSnafu {
                        entity: entity.name.clone()
                    }
                );
            }
        }
        Ok(())
    }
}
