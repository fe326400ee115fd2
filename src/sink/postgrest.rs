//! PostgREST destination client (Supabase-flavored).
//!
//! Writes go through the REST data API: one POST per batch with
//! `on_conflict` set to the entity's conflict key and a Prefer header
//! asking for merge-on-duplicate and a minimal response body. The
//! service key is sent both as the `apikey` header and as the bearer
//! token, which is what Supabase expects from server-side jobs.

use async_trait::async_trait;
use snafu::prelude::*;
use std::time::Duration;

use super::Destination;
use crate::config::DestinationConfig;
use crate::error::{
    ClientBuildSnafu, CountUnavailableSnafu, RejectedSnafu, TransportSnafu, WriteError,
};
use crate::record::TransformedRecord;

const UPSERT_PREFER: &str = "resolution=merge-duplicates,return=minimal";

pub struct PostgrestClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PostgrestClient {
    pub fn new(config: &DestinationConfig) -> Result<Self, WriteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

#[async_trait]
impl Destination for PostgrestClient {
    async fn upsert(
        &self,
        table: &str,
        conflict_key: &[String],
        records: &[TransformedRecord],
    ) -> Result<(), WriteError> {
        if records.is_empty() {
            return Ok(());
        }

        let response = self
            .authed(self.client.post(self.table_url(table)))
            .query(&[("on_conflict", conflict_key.join(","))])
            .header("Prefer", UPSERT_PREFER)
            .json(records)
            .send()
            .await
            .context(TransportSnafu)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        RejectedSnafu {
            status: status.as_u16(),
            body,
        }
        .fail()
    }

    async fn count(&self, table: &str) -> Result<u64, WriteError> {
        let response = self
            .authed(self.client.get(self.table_url(table)))
            .query(&[("select", "*")])
            .header("Prefer", "count=exact")
            .header("Range", "0-0")
            .send()
            .await
            .context(TransportSnafu)?;

        let status = response.status();
        ensure!(
            status.is_success(),
            CountUnavailableSnafu {
                message: format!("status {status}")
            }
        );

        let content_range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .context(CountUnavailableSnafu {
                message: "missing Content-Range header".to_string(),
            })?;

        parse_content_range(content_range).context(CountUnavailableSnafu {
            message: format!("unparseable Content-Range '{content_range}'"),
        })
    }
}

/// Extract the total from a Content-Range value like "0-0/3573" or
/// "*/0" for an empty table.
fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("0-0/3573"), Some(3573));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-24/*"), None);
        assert_eq!(parse_content_range("garbage"), None);
    }

    #[test]
    fn test_table_url() {
        let config = DestinationConfig {
            url: "https://proj.supabase.co/".to_string(),
            api_key: "k".to_string(),
            timeout_secs: 30,
        };
        let client = PostgrestClient::new(&config).unwrap();
        assert_eq!(
            client.table_url("electricity_prices_nve"),
            "https://proj.supabase.co/rest/v1/electricity_prices_nve"
        );
    }
}
