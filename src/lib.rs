//! kraftsync: batch synchronization of energy datasets into a
//! PostgREST backend.
//!
//! Reads records from CSV exports, SQLite lookup databases, and Notion
//! databases, normalizes them through per-entity field mappings, and
//! upserts them into Supabase tables with conflict-key merging. Every
//! run writes a JSON summary for scheduled-job monitoring.

pub mod config;
pub mod dlq;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod sink;
pub mod source;
pub mod transform;

pub use config::Config;
pub use pipeline::{run_pipeline, run_sync};
pub use report::RunSummary;
