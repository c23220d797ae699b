use std::collections::HashMap;
use std::sync::Arc;

use loom_bus::EventPublisher;
use loom_lease::{LeaseHandle, LeaseStore};
use loom_message::Intent;
use loom_workflow::WorkflowGraph;
use tokio_util::sync::CancellationToken;

use crate::config::OrchestratorConfig;
use crate::dispatcher::LeaseDispatcher;
use crate::effect::EffectHandler;
use crate::execution::WorkflowExecution;

/// Runs workflows under a single lease.
///
/// Effect handlers are bound per node type when the orchestrator is built; a
/// workflow naming a node type with no handler is rejected before anything runs.
pub struct Orchestrator {
  pub(crate) config: OrchestratorConfig,
  pub(crate) dispatcher: LeaseDispatcher,
  pub(crate) lease: LeaseHandle,
  pub(crate) lease_store: Option<Arc<dyn LeaseStore>>,
  pub(crate) handlers: HashMap<String, Arc<dyn EffectHandler>>,
  pub(crate) publisher: Arc<dyn EventPublisher>,
}

impl Orchestrator {
  pub fn new(
    config: OrchestratorConfig,
    lease: LeaseHandle,
    publisher: Arc<dyn EventPublisher>,
  ) -> Self {
    Self {
      dispatcher: LeaseDispatcher::new(config.owner.clone()),
      config,
      lease,
      lease_store: None,
      handlers: HashMap::new(),
      publisher,
    }
  }

  /// Bind the effect handler for a node type.
  pub fn with_handler(
    mut self,
    node_type: impl Into<String>,
    handler: Arc<dyn EffectHandler>,
  ) -> Self {
    self.handlers.insert(node_type.into(), handler);
    self
  }

  /// Refresh the lease from `store` before every batch.
  pub fn with_lease_store(mut self, store: Arc<dyn LeaseStore>) -> Self {
    self.lease_store = Some(store);
    self
  }

  pub fn config(&self) -> &OrchestratorConfig {
    &self.config
  }

  pub fn lease(&self) -> &LeaseHandle {
    &self.lease
  }

  pub fn dispatcher(&self) -> &LeaseDispatcher {
    &self.dispatcher
  }

  /// Prepare an execution of `graph`.
  ///
  /// `intents` binds upstream Intents to node ids. Nodes without one dispatch an
  /// Intent built from the node's own payload. Call `.wait()` on the returned
  /// handle to run it.
  pub fn execute_workflow<'a>(
    &'a self,
    graph: &'a WorkflowGraph,
    intents: HashMap<String, Intent>,
    cancel: CancellationToken,
  ) -> WorkflowExecution<'a> {
    let execution_id = uuid::Uuid::new_v4().to_string();
    WorkflowExecution::new(self, graph, execution_id, intents, cancel)
  }
}
