#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use pipewatch::config::{Config, Settings};
use pipewatch::engine::{Execution, ExecutionStatus, Workflow, WorkflowEngine};
use pipewatch::error::{Result, VerifyError};
use pipewatch::store::{DocumentStore, RecordSummary};
use tokio_util::sync::CancellationToken;

/// Scripted workflow engine. Each queue replays in order and repeats its last entry.
#[derive(Default)]
pub struct FakeEngine {
    workflows: Mutex<Option<Result<Vec<Workflow>>>>,
    listings: Mutex<VecDeque<Result<Vec<Execution>>>>,
    fetches: Mutex<VecDeque<Result<Execution>>>,
    detail: Mutex<Option<Execution>>,
    cancel_on_fetch: Mutex<Option<CancellationToken>>,
    calls: Mutex<Vec<String>>,
}

fn copy<T: Clone>(r: &Result<T>) -> Result<T> {
    match r {
        Ok(v) => Ok(v.clone()),
        Err(VerifyError::Transport { system, status, message }) => Err(VerifyError::Transport {
            system: system.clone(),
            status: *status,
            message: message.clone(),
        }),
        Err(e) => Err(VerifyError::decode("fake", e)),
    }
}

fn next<T: Clone>(queue: &Mutex<VecDeque<Result<T>>>) -> Result<T> {
    let mut q = queue.lock().unwrap();
    if q.len() > 1 {
        return q.pop_front().unwrap();
    }
    q.front().map(copy).unwrap_or_else(|| Err(VerifyError::decode("fake", "nothing scripted")))
}

impl FakeEngine {
    pub fn with_workflows(workflows: Vec<Workflow>) -> Self {
        let engine = Self::default();
        *engine.workflows.lock().unwrap() = Some(Ok(workflows));
        engine
    }

    pub fn healthy() -> Self {
        Self::with_workflows(vec![
            Workflow { id: "w1".into(), name: "Daily digest".into(), active: false },
            Workflow { id: "w2".into(), name: "iWatcher - Google Drive Auto Trigger".into(), active: true },
        ])
    }

    pub fn listing(self, executions: Vec<Execution>) -> Self {
        self.listings.lock().unwrap().push_back(Ok(executions));
        self
    }

    pub fn listing_err(self, err: VerifyError) -> Self {
        self.listings.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn fetch(self, status: ExecutionStatus) -> Self {
        self.fetches.lock().unwrap().push_back(Ok(Execution::new("new-1", status)));
        self
    }

    pub fn fetch_err(self, err: VerifyError) -> Self {
        self.fetches.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn detail(self, execution: Execution) -> Self {
        *self.detail.lock().unwrap() = Some(execution);
        self
    }

    /// Fires `token` on every status fetch, as if Ctrl-C arrived mid-await.
    pub fn cancel_on_fetch(self, token: CancellationToken) -> Self {
        *self.cancel_on_fetch.lock().unwrap() = Some(token);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl WorkflowEngine for FakeEngine {
    fn system(&self) -> &str {
        "n8n"
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        self.calls.lock().unwrap().push("workflows".into());
        match self.workflows.lock().unwrap().as_ref() {
            Some(r) => copy(r),
            None => Err(unreachable_engine()),
        }
    }

    async fn list_executions(&self, limit: usize) -> Result<Vec<Execution>> {
        self.calls.lock().unwrap().push(format!("list:{limit}"));
        next(&self.listings)
    }

    async fn get_execution(&self, id: &str, include_data: bool) -> Result<Execution> {
        self.calls.lock().unwrap().push(format!("get:{id}:{include_data}"));
        if let Some(token) = self.cancel_on_fetch.lock().unwrap().as_ref() {
            token.cancel();
        }
        if include_data {
            if let Some(detail) = self.detail.lock().unwrap().clone() {
                return Ok(detail);
            }
        }
        next(&self.fetches)
    }
}

pub struct FakeStore {
    pub records: Vec<RecordSummary>,
}

#[async_trait]
impl DocumentStore for FakeStore {
    fn system(&self) -> &str {
        "notion"
    }

    async fn query_recent(&self, page_size: usize) -> Result<Vec<RecordSummary>> {
        Ok(self.records.iter().take(page_size).cloned().collect())
    }
}

pub fn unreachable_engine() -> VerifyError {
    VerifyError::Transport {
        system: "n8n".into(),
        status: None,
        message: "unreachable: connection refused".into(),
    }
}

pub fn exec(id: &str, status: ExecutionStatus) -> Execution {
    Execution::new(id, status)
}

/// Settings with every default credential present.
pub fn settings() -> Settings {
    settings_with(&[])
}

pub fn settings_with(overrides: &[(&str, &str)]) -> Settings {
    let mut cfg = Config::from_pairs([
        ("N8N_API_KEY", "n8n-test-key"),
        ("ASSEMBLYAI_API_KEY", "aai-0123456789"),
        ("OPENAI_API_KEY", "sk-0123456789"),
        ("NOTION_API_TOKEN", "secret_0123456789"),
        ("NOTION_DATABASE_ID", "db-0123456789"),
    ]);
    for (k, v) in overrides {
        cfg.set(k, *v);
    }
    Settings::from_config(&cfg).unwrap()
}
