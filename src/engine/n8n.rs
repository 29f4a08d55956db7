use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT},
    Client,
};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, warn};

use super::{Execution, Workflow, WorkflowEngine};
use crate::{
    config::EngineSettings,
    error::{Result, VerifyError},
};

const SYSTEM: &str = "n8n";
const API_PREFIX: &str = "/api/v1";

/// Client for the n8n public REST API.
#[derive(Debug)]
pub struct N8nClient {
    client: Client,
    base: String,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
}

impl N8nClient {
    pub fn from_settings(settings: &EngineSettings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let name = HeaderName::from_bytes(settings.api_key_header.as_bytes())
            .map_err(|e| VerifyError::Config(format!("invalid N8N_API_KEY_HEADER: {e}")))?;
        let mut value = HeaderValue::from_str(&settings.api_key)
            .map_err(|e| VerifyError::Config(format!("invalid N8N_API_KEY: {e}")))?;
        value.set_sensitive(true);
        headers.insert(name, value);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(settings.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| VerifyError::transport(SYSTEM, e))?;

        Ok(Self { client, base: settings.base_url.trim_end_matches('/').to_string() })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}{}", self.base, API_PREFIX, path);
        debug!(%url, ?query, "n8n request");
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| VerifyError::transport(SYSTEM, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(%url, status = status.as_u16(), "n8n request failed");
            return Err(VerifyError::http_status(SYSTEM, status.as_u16(), &text));
        }
        let body = resp.text().await.map_err(|e| VerifyError::transport(SYSTEM, e))?;
        serde_json::from_str(&body).map_err(|e| VerifyError::decode(SYSTEM, e))
    }
}

#[async_trait]
impl WorkflowEngine for N8nClient {
    fn system(&self) -> &str {
        SYSTEM
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let page: Page<Workflow> = self.get_json("/workflows", &[]).await?;
        Ok(page.data)
    }

    async fn list_executions(&self, limit: usize) -> Result<Vec<Execution>> {
        let page: Page<Execution> = self
            .get_json("/executions", &[("limit", limit.to_string())])
            .await?;
        Ok(page.data)
    }

    async fn get_execution(&self, id: &str, include_data: bool) -> Result<Execution> {
        let query = if include_data {
            vec![("includeData", "true".to_string())]
        } else {
            Vec::new()
        };
        self.get_json(&format!("/executions/{id}"), &query).await
    }
}
