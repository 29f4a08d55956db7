//! Workflow engine model and the narrow read-only contract the monitor needs from it.

pub mod n8n;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;

pub use n8n::N8nClient;

#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// System name used in health results and errors.
    fn system(&self) -> &str;

    async fn list_workflows(&self) -> Result<Vec<Workflow>>;

    /// Most recent executions, newest first. `limit` is a hint.
    async fn list_executions(&self, limit: usize) -> Result<Vec<Execution>>;

    /// One execution by id. `include_data` asks for the run payload (error details).
    async fn get_execution(&self, id: &str, include_data: bool) -> Result<Execution>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExecutionStatus {
    Waiting,
    Running,
    Success,
    Error,
    /// Any status the engine reports that we do not interpret. Never terminal.
    Other(String),
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Error)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ExecutionStatus::Waiting => "waiting",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Other(s) => s,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "✅",
            ExecutionStatus::Error => "❌",
            ExecutionStatus::Running => "🔄",
            ExecutionStatus::Waiting => "⏳",
            ExecutionStatus::Other(_) => "⚪",
        }
    }
}

impl From<String> for ExecutionStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "waiting" | "new" => ExecutionStatus::Waiting,
            "running" => ExecutionStatus::Running,
            "success" => ExecutionStatus::Success,
            // n8n ends runs with these when they did not succeed
            "error" | "crashed" | "failed" | "canceled" => ExecutionStatus::Error,
            _ => ExecutionStatus::Other(s),
        }
    }
}

impl From<ExecutionStatus> for String {
    fn from(s: ExecutionStatus) -> Self {
        s.as_str().to_string()
    }
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        ExecutionStatus::Other("unknown".into())
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_data: Option<WorkflowRef>,
    #[serde(default, skip_serializing)]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRef {
    #[serde(default)]
    pub name: Option<String>,
}

impl Execution {
    pub fn new(id: impl Into<String>, status: ExecutionStatus) -> Self {
        Self {
            id: id.into(),
            status,
            started_at: None,
            stopped_at: None,
            workflow_id: None,
            workflow_data: None,
            data: None,
        }
    }

    pub fn workflow_name(&self) -> Option<&str> {
        self.workflow_data.as_ref().and_then(|w| w.name.as_deref())
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) if stop >= start => Some(stop - start),
            _ => None,
        }
    }

    /// Error message recorded by the engine for a failed run, when the payload was requested.
    pub fn error_message(&self) -> Option<String> {
        let result = self.data.as_ref()?.get("resultData")?;
        let error = result.get("error")?;
        let message = error.get("message").and_then(|v| v.as_str()).unwrap_or("unknown error");
        match result.get("lastNodeExecuted").and_then(|v| v.as_str()) {
            Some(node) => Some(format!("{message} (node: {node})")),
            None => Some(message.to_string()),
        }
    }
}

/// Ordered (newest first) window of executions captured at one point in time.
#[derive(Debug, Clone, Default)]
pub struct ExecutionSnapshot {
    pub executions: Vec<Execution>,
}

impl ExecutionSnapshot {
    pub fn new(executions: Vec<Execution>) -> Self {
        Self { executions }
    }

    pub fn newest(&self) -> Option<&Execution> {
        self.executions.first()
    }

    pub fn newest_id(&self) -> Option<&str> {
        self.newest().map(|e| e.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl From<RawId> for String {
    fn from(id: RawId) -> Self {
        match id {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

// n8n has used both string and numeric ids across versions
fn de_id<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    RawId::deserialize(d).map(String::from)
}

fn de_opt_id<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(d)?.map(String::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_public_api_execution() {
        let exec: Execution = serde_json::from_value(json!({
            "id": 4821,
            "finished": true,
            "mode": "trigger",
            "status": "success",
            "startedAt": "2025-10-06T09:15:02.113Z",
            "stoppedAt": "2025-10-06T09:16:30.000Z",
            "workflowId": "7Xa1",
            "workflowData": { "name": "iWatcher - Google Drive Auto Trigger" }
        }))
        .unwrap();
        assert_eq!(exec.id, "4821");
        assert_eq!(exec.status, ExecutionStatus::Success);
        assert_eq!(exec.workflow_name(), Some("iWatcher - Google Drive Auto Trigger"));
        assert_eq!(exec.duration().unwrap().num_seconds(), 87);
    }

    #[test]
    fn running_execution_has_no_duration() {
        let exec: Execution = serde_json::from_value(json!({
            "id": "e1",
            "status": "running",
            "startedAt": "2025-10-06T09:15:02Z",
            "stoppedAt": null
        }))
        .unwrap();
        assert!(!exec.status.is_terminal());
        assert!(exec.duration().is_none());
        assert!(exec.workflow_name().is_none());
    }

    #[test]
    fn status_aliases_map_onto_lifecycle() {
        assert_eq!(ExecutionStatus::from("new".to_string()), ExecutionStatus::Waiting);
        assert_eq!(ExecutionStatus::from("crashed".to_string()), ExecutionStatus::Error);
        assert_eq!(ExecutionStatus::from("canceled".to_string()), ExecutionStatus::Error);
        let odd = ExecutionStatus::from("unknown".to_string());
        assert!(!odd.is_terminal());
        assert_eq!(odd.icon(), "⚪");
    }

    #[test]
    fn error_message_reads_result_data() {
        let mut exec = Execution::new("e9", ExecutionStatus::Error);
        exec.data = Some(json!({
            "resultData": {
                "error": { "message": "AssemblyAI returned 401" },
                "lastNodeExecuted": "Transcribe"
            }
        }));
        assert_eq!(exec.error_message().as_deref(), Some("AssemblyAI returned 401 (node: Transcribe)"));
    }

    #[test]
    fn snapshot_newest_is_first_entry() {
        let snap = ExecutionSnapshot::new(vec![
            Execution::new("b", ExecutionStatus::Running),
            Execution::new("a", ExecutionStatus::Success),
        ]);
        assert_eq!(snap.newest_id(), Some("b"));
        assert_eq!(ExecutionSnapshot::default().newest_id(), None);
    }
}
