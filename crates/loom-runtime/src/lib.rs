//! Runtime wiring for loom nodes.
//!
//! ```text
//! Envelope ──▶ EnvelopeRunner ──▶ HandlerRegistry::resolve ──▶ Handler
//!                   │                                            │
//!                   ◀──────────── HandlerOutput (shape checked) ◀┘
//!                   │
//!                   ▼
//!             EventPublisher
//! ```
//!
//! [`ReducerNode`] and [`OrchestratorNode`] are ready-made handlers composed from
//! [`NodeCapabilities`].

mod capabilities;
mod config;
mod error;
mod orchestrator_node;
mod reducer;
mod runner;

pub use capabilities::{AlwaysHealthy, HealthCheck, HealthStatus, NodeCapabilities};
pub use config::RunnerConfig;
pub use error::RuntimeError;
pub use orchestrator_node::OrchestratorNode;
pub use reducer::ReducerNode;
pub use runner::EnvelopeRunner;
