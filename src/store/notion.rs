use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{DocumentStore, RecordSummary};
use crate::{
    config::StoreSettings,
    error::{Result, VerifyError},
};

const SYSTEM: &str = "notion";

pub struct NotionClient {
    client: Client,
    base: String,
    token: String,
    database_id: String,
    api_version: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    properties: Value,
    created_time: Option<DateTime<Utc>>,
}

impl Page {
    fn title(&self) -> String {
        self.properties
            .pointer("/Title/title/0/text/content")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("Untitled")
            .to_string()
    }
}

impl NotionClient {
    /// Returns `None` when the token or database id is missing.
    pub fn from_settings(settings: &StoreSettings) -> Result<Option<Self>> {
        let (Some(token), Some(database_id)) = (settings.token.clone(), settings.database_id.clone()) else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| VerifyError::transport(SYSTEM, e))?;

        Ok(Some(Self {
            client,
            base: settings.base_url.trim_end_matches('/').to_string(),
            token,
            database_id,
            api_version: settings.api_version.clone(),
        }))
    }
}

#[async_trait]
impl DocumentStore for NotionClient {
    fn system(&self) -> &str {
        SYSTEM
    }

    async fn query_recent(&self, page_size: usize) -> Result<Vec<RecordSummary>> {
        let url = format!("{}/v1/databases/{}/query", self.base, self.database_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.api_version)
            .json(&serde_json::json!({
                "page_size": page_size,
                "sorts": [{ "timestamp": "created_time", "direction": "descending" }]
            }))
            .send()
            .await
            .map_err(|e| VerifyError::transport(SYSTEM, e))?;

        match resp.status() {
            StatusCode::OK => {
                let body: QueryResponse = resp
                    .json()
                    .await
                    .map_err(|e| VerifyError::decode(SYSTEM, e))?;
                Ok(body
                    .results
                    .iter()
                    .map(|page| RecordSummary { title: page.title(), created_time: page.created_time })
                    .collect())
            }
            status => {
                let text = resp.text().await.unwrap_or_default();
                Err(VerifyError::http_status(SYSTEM, status.as_u16(), &text))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base: &str, token: Option<&str>) -> StoreSettings {
        StoreSettings {
            base_url: base.to_string(),
            token: token.map(str::to_string),
            database_id: Some("db123".into()),
            api_version: "2022-06-28".into(),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn missing_token_builds_no_client() {
        assert!(NotionClient::from_settings(&settings("http://x", None)).unwrap().is_none());
    }

    #[tokio::test]
    async fn query_reads_titles_and_created_time() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db123/query"))
            .and(header("authorization", "Bearer secret"))
            .and(header("Notion-Version", "2022-06-28"))
            .and(body_partial_json(json!({ "page_size": 2 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {
                        "created_time": "2025-10-06T09:20:00.000Z",
                        "properties": { "Title": { "title": [ { "text": { "content": "Standup notes" } } ] } }
                    },
                    { "created_time": "2025-10-05T08:00:00.000Z", "properties": { "Title": { "title": [] } } }
                ]
            })))
            .mount(&server)
            .await;

        let client = NotionClient::from_settings(&settings(&server.uri(), Some("secret")))
            .unwrap()
            .unwrap();
        let records = client.query_recent(2).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Standup notes");
        assert_eq!(records[1].title, "Untitled");
        assert_eq!(
            records[0].created_time.unwrap().format("%Y-%m-%d").to_string(),
            "2025-10-06"
        );
    }

    #[tokio::test]
    async fn api_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("API token is invalid."))
            .mount(&server)
            .await;

        let client = NotionClient::from_settings(&settings(&server.uri(), Some("bad")))
            .unwrap()
            .unwrap();
        let err = client.query_recent(5).await.unwrap_err();
        assert_eq!(err.to_string(), "notion transport error (HTTP 401): API token is invalid.");
    }
}
