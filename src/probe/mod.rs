//! Single-shot readiness checks. A probe never fails: every failure mode is
//! folded into a [`HealthResult`] with `ready == false`.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::{
    config::mask_secret,
    engine::Workflow,
    error::{Result, VerifyError},
};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResult {
    pub system: String,
    pub reachable: bool,
    pub ready: bool,
    pub message: Option<String>,
    /// Extra lines shown under the result (workflow counts, masked credentials).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl HealthResult {
    pub fn ready(system: &str, message: impl Into<String>) -> Self {
        Self {
            system: system.to_string(),
            reachable: true,
            ready: true,
            message: Some(message.into()),
            details: Vec::new(),
        }
    }

    pub fn not_ready(system: &str, reachable: bool, message: impl Into<String>) -> Self {
        Self {
            system: system.to_string(),
            reachable,
            ready: false,
            message: Some(message.into()),
            details: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}

/// Verdict of a readiness predicate over a successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready { message: String, details: Vec<String> },
    NotReady { reason: String, details: Vec<String> },
}

#[derive(Debug, Clone, Copy)]
pub struct HealthProbe {
    timeout: Duration,
}

impl Default for HealthProbe {
    fn default() -> Self {
        Self { timeout: DEFAULT_PROBE_TIMEOUT }
    }
}

impl HealthProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Runs `request` under the probe timeout and applies `predicate` to its response.
    pub async fn check<T, F, P>(&self, system: &str, request: F, predicate: P) -> HealthResult
    where
        F: Future<Output = Result<T>>,
        P: FnOnce(&T) -> Readiness,
    {
        let result = match tokio::time::timeout(self.timeout, request).await {
            Err(_) => HealthResult::not_ready(
                system,
                false,
                format!("timed out after {}s", self.timeout.as_secs()),
            ),
            Ok(Err(e)) => failure_result(system, e),
            Ok(Ok(resp)) => match predicate(&resp) {
                Readiness::Ready { message, details } => {
                    HealthResult::ready(system, message).with_details(details)
                }
                Readiness::NotReady { reason, details } => {
                    HealthResult::not_ready(system, true, reason).with_details(details)
                }
            },
        };
        debug!(system, ready = result.ready, reachable = result.reachable, "health probe");
        result
    }
}

fn failure_result(system: &str, err: VerifyError) -> HealthResult {
    match err {
        VerifyError::Transport { status: Some(code), message, .. } => {
            HealthResult::not_ready(system, true, format!("HTTP {code}: {message}"))
        }
        VerifyError::Transport { status: None, message, .. } => {
            HealthResult::not_ready(system, false, message)
        }
        VerifyError::Decode { message, .. } => {
            HealthResult::not_ready(system, true, format!("unexpected response: {message}"))
        }
        VerifyError::Config(message) => HealthResult::not_ready(system, false, message),
    }
}

/// Ready when a workflow whose name contains `needle` (case-insensitive) exists and is active.
pub fn workflow_active(needle: &str) -> impl FnOnce(&Vec<Workflow>) -> Readiness + '_ {
    move |workflows: &Vec<Workflow>| {
        let active = workflows.iter().filter(|w| w.active).count();
        let mut details = vec![
            format!("Total workflows: {}", workflows.len()),
            format!("Active workflows: {active}"),
        ];
        let needle_lower = needle.to_lowercase();
        match workflows.iter().find(|w| w.name.to_lowercase().contains(&needle_lower)) {
            None => Readiness::NotReady {
                reason: format!("workflow matching '{needle}' not found"),
                details,
            },
            Some(w) if !w.active => {
                details.push(format!("{} ({}): inactive", w.name, w.id));
                Readiness::NotReady {
                    reason: format!("workflow '{}' is not active; activate it in the n8n UI or via API", w.name),
                    details,
                }
            }
            Some(w) => {
                details.push(format!("{} ({}): active", w.name, w.id));
                Readiness::Ready { message: "n8n is running".into(), details }
            }
        }
    }
}

/// Presence-only check of the named credentials. Values are masked in the details.
pub fn check_environment(credentials: &[(String, Option<String>)]) -> HealthResult {
    let mut details = Vec::with_capacity(credentials.len());
    let mut missing = Vec::new();
    for (name, value) in credentials {
        match value {
            Some(v) => details.push(format!("✅ {name}: {}", mask_secret(v))),
            None => {
                details.push(format!("❌ {name}: not set"));
                missing.push(name.as_str());
            }
        }
    }
    let result = if missing.is_empty() {
        HealthResult::ready("environment", "all required credentials set")
    } else {
        HealthResult::not_ready("environment", true, format!("missing: {}", missing.join(", ")))
    };
    result.with_details(details)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wf(id: &str, name: &str, active: bool) -> Workflow {
        Workflow { id: id.into(), name: name.into(), active }
    }

    #[tokio::test]
    async fn ready_when_workflow_active() {
        let probe = HealthProbe::default();
        let workflows = vec![wf("1", "Other", false), wf("2", "iWatcher - Google Drive Auto Trigger", true)];
        let result = probe
            .check("n8n", async { Ok::<_, VerifyError>(workflows) }, workflow_active("iwatcher"))
            .await;
        assert!(result.ready && result.reachable);
        assert!(result.details.contains(&"Active workflows: 1".to_string()));
    }

    #[tokio::test]
    async fn inactive_workflow_is_reachable_but_not_ready() {
        let probe = HealthProbe::default();
        let result = probe
            .check("n8n", async { Ok::<_, VerifyError>(vec![wf("2", "iWatcher", false)]) }, workflow_active("iwatcher"))
            .await;
        assert!(result.reachable);
        assert!(!result.ready);
        assert!(result.message.unwrap().contains("not active"));
    }

    #[tokio::test]
    async fn http_failure_is_captured() {
        let probe = HealthProbe::default();
        let result = probe
            .check(
                "n8n",
                async { Err::<Vec<Workflow>, _>(VerifyError::http_status("n8n", 500, "oops")) },
                workflow_active("iwatcher"),
            )
            .await;
        assert!(!result.ready);
        assert_eq!(result.message.as_deref(), Some("HTTP 500: oops"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_system_times_out() {
        let probe = HealthProbe::new(Duration::from_secs(10));
        let result = probe
            .check(
                "n8n",
                async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, VerifyError>(Vec::<Workflow>::new())
                },
                workflow_active("iwatcher"),
            )
            .await;
        assert!(!result.reachable);
        assert_eq!(result.message.as_deref(), Some("timed out after 10s"));
    }

    #[test]
    fn environment_reports_missing_names() {
        let creds = vec![
            ("OPENAI_API_KEY".to_string(), Some("sk-abcdefghijk".to_string())),
            ("ASSEMBLYAI_API_KEY".to_string(), None),
        ];
        let result = check_environment(&creds);
        assert!(!result.ready);
        assert_eq!(result.message.as_deref(), Some("missing: ASSEMBLYAI_API_KEY"));
        assert_eq!(result.details[0], "✅ OPENAI_API_KEY: sk-abcde...");
    }
}
