//! Polling core: list, watch for a new execution, await its terminal state.

mod awaiter;
mod watcher;

use std::sync::Arc;

use tracing::debug;

use crate::{
    engine::{ExecutionSnapshot, WorkflowEngine},
    error::Result,
};

pub use awaiter::{AwaitOutcome, ExecutionAwaiter};
pub use watcher::{ExecutionWatcher, WatchOutcome};

/// Consecutive failed polls tolerated before a poll loop gives up on the engine.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Fetches a bounded, newest-first window of executions. Order is the engine's.
#[derive(Clone)]
pub struct ExecutionLister {
    engine: Arc<dyn WorkflowEngine>,
}

impl ExecutionLister {
    pub fn new(engine: Arc<dyn WorkflowEngine>) -> Self {
        Self { engine }
    }

    pub async fn list(&self, limit: usize) -> Result<ExecutionSnapshot> {
        let executions = self.engine.list_executions(limit).await?;
        debug!(limit, returned = executions.len(), newest = ?executions.first().map(|e| &e.id), "listed executions");
        Ok(ExecutionSnapshot::new(executions))
    }
}
