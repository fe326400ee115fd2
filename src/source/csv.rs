//! CSV file source.
//!
//! Government open-data exports are inconsistent about encoding: some
//! carry a UTF-8 BOM, older ones are Latin-1. The reader probes for a
//! BOM, tries strict UTF-8, then falls back to Latin-1 before giving
//! up. The whole file is parsed eagerly at open time so malformed rows
//! fail the entity before anything is written.

use async_trait::async_trait;
use serde_json::Value;
use snafu::prelude::*;
use std::collections::VecDeque;
use std::path::Path;

use super::SourceReader;
use crate::error::{CsvSnafu, FileOpenSnafu, SourceError};
use crate::record::RawRecord;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

pub struct CsvReader {
    path: String,
    page_size: usize,
    rows: VecDeque<RawRecord>,
    exhausted: bool,
}

impl CsvReader {
    pub fn open(
        path: impl AsRef<Path>,
        delimiter: char,
        page_size: usize,
    ) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let bytes = std::fs::read(path).context(FileOpenSnafu { path: &display })?;
        let content = decode(&bytes);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter as u8)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .context(CsvSnafu { path: &display })?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = VecDeque::new();
        for row in reader.records() {
            let row = row.context(CsvSnafu { path: &display })?;
            let record: RawRecord = headers
                .iter()
                .zip(row.iter())
                .map(|(header, field)| (header.clone(), Value::String(field.to_string())))
                .collect();
            rows.push_back(record);
        }

        Ok(Self {
            path: display,
            page_size,
            rows,
            exhausted: false,
        })
    }
}

#[async_trait]
impl SourceReader for CsvReader {
    async fn next_page(&mut self) -> Result<Option<Vec<RawRecord>>, SourceError> {
        if self.exhausted {
            return Ok(None);
        }
        let take = self.page_size.min(self.rows.len());
        if take == 0 {
            self.exhausted = true;
            return Ok(None);
        }
        Ok(Some(self.rows.drain(..take).collect()))
    }

    fn describe(&self) -> String {
        format!("csv file {}", self.path)
    }
}

/// Decode file bytes: strip a UTF-8 BOM if present, try strict UTF-8,
/// fall back to Latin-1 (which accepts any byte sequence).
fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        // Latin-1 maps each byte to the code point of the same value
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
