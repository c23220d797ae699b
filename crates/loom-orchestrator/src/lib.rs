//! Workflow orchestration.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Orchestrator                        │
//! │  - owns the lease handle, effect handlers, publisher     │
//! │  - execute_workflow(graph, intents, cancel)              │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                   WorkflowExecution                      │
//! │  - runs batches in order, parallel or sequential         │
//! │  - applies retry / skip / abort                          │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                    LeaseDispatcher                       │
//! │  - Intent → Action stamped with (lease_id, epoch)        │
//! │  - drops stale Actions before the effect handler runs    │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod backoff;
mod config;
mod dispatcher;
mod effect;
mod error;
mod execution;
mod orchestrator;
mod report;

pub use backoff::{MAX_BACKOFF_MS, RetryPolicy};
pub use config::OrchestratorConfig;
pub use dispatcher::LeaseDispatcher;
pub use effect::EffectHandler;
pub use error::{DispatchError, OrchestratorError};
pub use execution::WorkflowExecution;
pub use orchestrator::Orchestrator;
pub use report::{AttemptOutcome, AttemptRecord, NodeStatus, WorkflowReport};
