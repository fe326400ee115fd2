//! SQLite file source.
//!
//! Reads rows through a configured query in bounded pages by wrapping
//! the query in a LIMIT/OFFSET subselect. Queries are small and local,
//! so the synchronous rusqlite calls run inline on the worker task.

use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde_json::{Number, Value};
use snafu::prelude::*;
use std::path::Path;

use super::SourceReader;
use crate::error::{SourceError, SqliteSnafu};
use crate::record::RawRecord;

pub struct SqliteReader {
    conn: Connection,
    query: String,
    page_size: usize,
    offset: usize,
    exhausted: bool,
    path: String,
}

impl SqliteReader {
    pub fn open(
        path: impl AsRef<Path>,
        query: &str,
        page_size: usize,
    ) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )
        .context(SqliteSnafu)?;

        Ok(Self {
            conn,
            query: query.to_string(),
            page_size,
            offset: 0,
            exhausted: false,
            path: path.display().to_string(),
        })
    }

    fn fetch_page(&mut self) -> Result<Vec<RawRecord>, SourceError> {
        let paged = format!("SELECT * FROM ({}) LIMIT ?1 OFFSET ?2", self.query);
        let mut stmt = self.conn.prepare(&paged).context(SqliteSnafu)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut rows = stmt
            .query((self.page_size as i64, self.offset as i64))
            .context(SqliteSnafu)?;

        let mut page = Vec::new();
        while let Some(row) = rows.next().context(SqliteSnafu)? {
            let mut record = RawRecord::new();
            for (idx, column) in columns.iter().enumerate() {
                let value = json_value(row.get_ref(idx).context(SqliteSnafu)?);
                record.insert(column.clone(), value);
            }
            page.push(record);
        }
        Ok(page)
    }
}

#[async_trait]
impl SourceReader for SqliteReader {
    async fn next_page(&mut self) -> Result<Option<Vec<RawRecord>>, SourceError> {
        if self.exhausted {
            return Ok(None);
        }
        let page = self.fetch_page()?;
        if page.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        self.offset += page.len();
        Ok(Some(page))
    }

    fn describe(&self) -> String {
        format!("sqlite database {}", self.path)
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        // Blob columns have no destination representation
        ValueRef::Blob(_) => Value::Null,
    }
}
