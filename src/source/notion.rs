//! Notion database source.
//!
//! Queries a Notion database through the paginated JSON API and
//! flattens page properties into flat raw records. Pagination follows
//! the cursor protocol: request a page, carry `next_cursor` forward
//! while `has_more` is true, and stop issuing requests as soon as the
//! final page arrives.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Number, Value};
use snafu::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

use super::SourceReader;
use crate::error::{ApiSnafu, HttpSnafu, SourceError};
use crate::record::RawRecord;

const NOTION_VERSION: &str = "2022-06-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct NotionReader {
    client: reqwest::Client,
    query_url: String,
    api_key: String,
    page_size: usize,
    database_id: String,
    cursor: Option<String>,
    exhausted: bool,
}

impl NotionReader {
    pub fn new(
        api_url: &str,
        database_id: &str,
        api_key: &str,
        page_size: usize,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context(HttpSnafu)?;

        Ok(Self {
            client,
            query_url: format!(
                "{}/databases/{}/query",
                api_url.trim_end_matches('/'),
                database_id
            ),
            api_key: api_key.to_string(),
            page_size,
            database_id: database_id.to_string(),
            cursor: None,
            exhausted: false,
        })
    }
}

#[async_trait]
impl SourceReader for NotionReader {
    async fn next_page(&mut self) -> Result<Option<Vec<RawRecord>>, SourceError> {
        if self.exhausted {
            return Ok(None);
        }

        let mut body = serde_json::json!({ "page_size": self.page_size });
        if let Some(cursor) = &self.cursor {
            body["start_cursor"] = Value::String(cursor.clone());
        }

        let response = self
            .client
            .post(&self.query_url)
            .bearer_auth(&self.api_key)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await
            .context(HttpSnafu)?;

        let status = response.status();
        let text = response.text().await.context(HttpSnafu)?;
        ensure!(
            status.is_success(),
            ApiSnafu {
                status: status.as_u16(),
                body: text
            }
        );

        let (records, next_cursor) = decode_page(&text)?;
        match next_cursor {
            Some(cursor) => self.cursor = Some(cursor),
            None => self.exhausted = true,
        }
        Ok(Some(records))
    }

    fn describe(&self) -> String {
        format!("notion database {}", self.database_id)
    }
}

/// Decode one query response into flat records plus the cursor for the
/// next request (`None` when this was the final page).
fn decode_page(body: &str) -> Result<(Vec<RawRecord>, Option<String>), SourceError> {
    let response: QueryResponse = serde_json::from_str(body).map_err(|e| {
        ApiSnafu {
            status: 200u16,
            body: format!("unexpected response shape: {e}"),
        }
        .build()
    })?;

    let records = response
        .results
        .into_iter()
        .map(|page| {
            page.properties
                .into_iter()
                .map(|(name, prop)| (name, prop.into_value()))
                .collect()
        })
        .collect();

    let cursor = if response.has_more {
        response.next_cursor
    } else {
        None
    };
    Ok((records, cursor))
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<Page>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    properties: HashMap<String, PropertyValue>,
}

/// A Notion page property, decoded by its `type` tag. Unknown property
/// types decode to null rather than failing the page.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PropertyValue {
    Title {
        title: Vec<RichText>,
    },
    RichText {
        rich_text: Vec<RichText>,
    },
    Number {
        number: Option<f64>,
    },
    Checkbox {
        checkbox: bool,
    },
    Select {
        select: Option<SelectOption>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct RichText {
    #[serde(default)]
    plain_text: String,
}

#[derive(Debug, Deserialize)]
struct SelectOption {
    name: String,
}

impl PropertyValue {
    fn into_value(self) -> Value {
        match self {
            PropertyValue::Title { title } => join_rich_text(title),
            PropertyValue::RichText { rich_text } => join_rich_text(rich_text),
            PropertyValue::Number { number } => number
                .and_then(Number::from_f64)
                .map_or(Value::Null, Value::Number),
            PropertyValue::Checkbox { checkbox } => Value::Bool(checkbox),
            PropertyValue::Select { select } => {
                select.map_or(Value::Null, |option| Value::String(option.name))
            }
            PropertyValue::Unknown => Value::Null,
        }
    }
}

fn join_rich_text(parts: Vec<RichText>) -> Value {
    let text: String = parts.into_iter().map(|part| part.plain_text).collect();
    if text.is_empty() {
        Value::Null
    } else {
        Value::String(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page_json(name: &str, value: f64, last: bool) -> String {
        json!({
            "results": [{
                "object": "page",
                "id": "abc",
                "properties": {
                    "Name": {
                        "id": "t",
                        "type": "title",
                        "title": [
                            {"plain_text": name, "type": "text"}
                        ]
                    },
                    "Value": {"id": "n", "type": "number", "number": value},
                    "Enabled": {"id": "c", "type": "checkbox", "checkbox": true},
                    "Category": {
                        "id": "s",
                        "type": "select",
                        "select": {"name": "physics", "color": "blue"}
                    },
                    "Description": {
                        "id": "r",
                        "type": "rich_text",
                        "rich_text": [
                            {"plain_text": "part one ", "type": "text"},
                            {"plain_text": "part two", "type": "text"}
                        ]
                    },
                    "Updated": {
                        "id": "d",
                        "type": "last_edited_time",
                        "last_edited_time": "2024-01-01T00:00:00Z"
                    }
                }
            }],
            "has_more": !last,
            "next_cursor": if last { Value::Null } else { json!("cursor-1") }
        })
        .to_string()
    }

    #[test]
    fn test_decode_page_properties() {
        let (records, cursor) = decode_page(&page_json("gravity", 9.81, true)).unwrap();
        assert_eq!(records.len(), 1);
        assert!(cursor.is_none());

        let record = &records[0];
        assert_eq!(record["Name"], json!("gravity"));
        assert_eq!(record["Value"], json!(9.81));
        assert_eq!(record["Enabled"], json!(true));
        assert_eq!(record["Category"], json!("physics"));
        assert_eq!(record["Description"], json!("part one part two"));
        // Unknown property types decode to null, not an error
        assert_eq!(record["Updated"], Value::Null);
    }

    #[test]
    fn test_decode_page_cursor_carried() {
        let (_, cursor) = decode_page(&page_json("x", 1.0, false)).unwrap();
        assert_eq!(cursor.as_deref(), Some("cursor-1"));
    }

    #[test]
    fn test_decode_empty_select_and_title() {
        let body = json!({
            "results": [{
                "properties": {
                    "Name": {"type": "title", "title": []},
                    "Category": {"type": "select", "select": null},
                    "Value": {"type": "number", "number": null}
                }
            }],
            "has_more": false,
            "next_cursor": null
        })
        .to_string();

        let (records, _) = decode_page(&body).unwrap();
        assert_eq!(records[0]["Name"], Value::Null);
        assert_eq!(records[0]["Category"], Value::Null);
        assert_eq!(records[0]["Value"], Value::Null);
    }

    #[test]
    fn test_decode_malformed_body() {
        assert!(decode_page("not json").is_err());
    }

    #[test]
    fn test_has_more_false_overrides_cursor() {
        // A cursor next to has_more=false must not trigger another request
        let body = json!({
            "results": [],
            "has_more": false,
            "next_cursor": "stale"
        })
        .to_string();
        let (records, cursor) = decode_page(&body).unwrap();
        assert!(records.is_empty());
        assert!(cursor.is_none());
    }
}
