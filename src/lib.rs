//! Execution monitor for an n8n-triggered transcription pipeline.
//!
//! Pre-flight probes the workflow engine, the required credentials and the
//! document store. The verifier then watches the engine's execution log for
//! a new run, polls that run to a terminal state and gathers post-run
//! evidence from the store.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod printer;
pub mod probe;
pub mod report;
pub mod store;
pub mod verifier;

pub use error::{Result, VerifyError};
