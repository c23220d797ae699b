//! Loom Workflow
//!
//! Workflow definitions as supplied by the contract loader, and the validated
//! dependency graph the orchestrator executes.
//!
//! A [`WorkflowGraph`] is only constructible from an acyclic definition with unique
//! node ids, so holding one means its execution order exists:
//! - nodes are grouped into batches with no dependency inside a batch
//! - batches are in topological order
//! - entry points and join points are identified

mod definition;
mod graph;

pub use definition::{
  ExecutionMode, FailureRecoveryStrategy, RetryBackoff, WorkflowDefinition, WorkflowNode,
};
pub use graph::{WorkflowGraph, compute_order};
