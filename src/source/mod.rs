//! Source connectors producing raw records in bounded pages.
//!
//! Every source, local or remote, is consumed through the same paged
//! interface. Remote connectors fetch one page per request; local file
//! readers may parse eagerly at open and serve from a buffer, but the
//! pipeline only ever sees one page at a time.

mod csv;
mod notion;
mod sqlite;

use async_trait::async_trait;

use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::record::RawRecord;

pub use csv::CsvReader;
pub use notion::NotionReader;
pub use sqlite::SqliteReader;

/// A paged reader over one entity's source.
///
/// `next_page` returns `Ok(Some(records))` until the source is
/// exhausted, then `Ok(None)`. After exhaustion the reader makes no
/// further requests against the underlying source.
#[async_trait]
pub trait SourceReader: Send {
    async fn next_page(&mut self) -> Result<Option<Vec<RawRecord>>, SourceError>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// Open a reader for the configured source.
pub fn open(source: &SourceConfig) -> Result<Box<dyn SourceReader>, SourceError> {
    match source {
        SourceConfig::Csv {
            path,
            delimiter,
            page_size,
        } => Ok(Box::new(CsvReader::open(path, *delimiter, *page_size)?)),
        SourceConfig::Sqlite {
            path,
            query,
            page_size,
        } => Ok(Box::new(SqliteReader::open(path, query, *page_size)?)),
        SourceConfig::Notion {
            database_id,
            api_key,
            page_size,
            api_url,
        } => Ok(Box::new(NotionReader::new(
            api_url,
            database_id,
            api_key,
            *page_size,
        )?)),
    }
}
