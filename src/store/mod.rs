//! Downstream document store: readiness and post-run evidence.

pub mod notion;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;

pub use notion::NotionClient;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn system(&self) -> &str;

    /// Most recently created records, newest first.
    async fn query_recent(&self, page_size: usize) -> Result<Vec<RecordSummary>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub title: String,
    pub created_time: Option<DateTime<Utc>>,
}

/// Outcome of a store probe. Never an error: the store is advisory.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum StoreEvidence {
    Available(Vec<RecordSummary>),
    Unavailable(String),
}

impl StoreEvidence {
    pub fn is_available(&self) -> bool {
        matches!(self, StoreEvidence::Available(_))
    }
}

/// Wraps an optional store; a missing store (no credentials) is reported as unavailable.
#[derive(Clone)]
pub struct DocumentStoreProbe {
    store: Option<Arc<dyn DocumentStore>>,
}

impl DocumentStoreProbe {
    pub fn new(store: Option<Arc<dyn DocumentStore>>) -> Self {
        Self { store }
    }

    pub fn unconfigured() -> Self {
        Self { store: None }
    }

    pub async fn query_recent(&self, page_size: usize) -> StoreEvidence {
        let Some(store) = &self.store else {
            debug!("document store credentials not configured");
            return StoreEvidence::Unavailable("credentials not configured".into());
        };
        match store.query_recent(page_size).await {
            Ok(records) => {
                debug!(system = store.system(), count = records.len(), "document store query ok");
                StoreEvidence::Available(records)
            }
            Err(e) => {
                warn!(system = store.system(), error = %e, "document store query failed");
                StoreEvidence::Unavailable(e.to_string())
            }
        }
    }
}
