use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use loom_bus::EventPublisher;
use loom_handler::{Handler, HandlerError, HandlerOutput, NodeKind, OutputOrigin};
use loom_message::{DynPayload, Envelope, Intent, MessageCategory};
use loom_orchestrator::{Orchestrator, OrchestratorError, WorkflowReport};
use loom_workflow::WorkflowGraph;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::capabilities::{HealthStatus, NodeCapabilities};

const TRIGGER_NAMESPACE: Uuid = Uuid::from_u128(0x6c6f_6f6d_2d74_7269_6767_6572_2d69_6e74);

/// An orchestrator exposed as a handler.
///
/// Each intent envelope starts one execution of the workflow. The envelope's body
/// becomes the payload of the workflow's entry nodes; other nodes use their own
/// payload. The node replies with a `workflow.completed` event carrying the report
/// summary.
pub struct OrchestratorNode {
  handler_id: String,
  orchestrator: Arc<Orchestrator>,
  graph: Arc<WorkflowGraph>,
  capabilities: NodeCapabilities,
  cancel: CancellationToken,
}

impl OrchestratorNode {
  pub fn new(
    handler_id: impl Into<String>,
    orchestrator: Arc<Orchestrator>,
    graph: Arc<WorkflowGraph>,
    capabilities: NodeCapabilities,
  ) -> Self {
    Self {
      handler_id: handler_id.into(),
      orchestrator,
      graph,
      capabilities,
      cancel: CancellationToken::new(),
    }
  }

  /// Cancelling this token cancels every execution the node has in flight.
  pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn publisher(&self) -> &dyn EventPublisher {
    self.capabilities.publisher.as_ref()
  }

  pub fn health(&self) -> HealthStatus {
    self.capabilities.health.check()
  }

  /// One intent per entry node, derived from the trigger envelope.
  fn entry_intents(&self, envelope: &Envelope<DynPayload>) -> HashMap<String, Intent> {
    let payload = envelope.payload();
    self
      .graph
      .entry_points()
      .iter()
      .filter_map(|node_id| self.graph.node(node_id))
      .map(|node| {
        let name = format!("{}|{}", envelope.envelope_id(), node.node_id);
        let intent = Intent::new(
          Uuid::new_v5(&TRIGGER_NAMESPACE, name.as_bytes()),
          payload.payload_type.clone(),
          node.node_type.clone(),
          payload.body.clone(),
          envelope.priority(),
        );
        (node.node_id.clone(), intent)
      })
      .collect()
  }
}

fn summary(report: &WorkflowReport) -> serde_json::Value {
  json!({
    "workflow_id": report.workflow_id,
    "execution_id": report.execution_id,
    "node_status": report.node_status,
    "skipped": report.skipped,
    "retried": report.retried,
    "superseded": report.superseded,
  })
}

#[async_trait]
impl Handler for OrchestratorNode {
  fn handler_id(&self) -> &str {
    &self.handler_id
  }

  fn node_kind(&self) -> NodeKind {
    NodeKind::Orchestrator
  }

  async fn handle(
    &self,
    envelope: &Envelope<DynPayload>,
  ) -> Result<HandlerOutput<serde_json::Value>, HandlerError> {
    if envelope.payload().category != MessageCategory::Intent {
      return Err(HandlerError::invalid_input(format!(
        "orchestrator '{}' only accepts intents, got {:?}",
        self.handler_id,
        envelope.payload().category
      )));
    }

    let correlation_id = envelope
      .correlation_id()
      .unwrap_or_else(|| envelope.envelope_id());
    let execution = self
      .orchestrator
      .execute_workflow(&self.graph, self.entry_intents(envelope), self.cancel.child_token())
      .with_correlation_id(correlation_id);
    let execution_id = execution.execution_id().to_string();

    info!(
      handler_id = %self.handler_id,
      execution_id = %execution_id,
      envelope_id = %envelope.envelope_id(),
      "workflow_triggered"
    );

    let report = match execution.wait().await {
      Ok(report) => report,
      Err(OrchestratorError::Aborted {
        node_id,
        source,
        report,
      }) => {
        warn!(handler_id = %self.handler_id, node_id = %node_id, "workflow_aborted");
        let event = DynPayload::event(
          "workflow.aborted",
          json!({
            "failed_node": node_id,
            "error": source.to_string(),
            "last_completed_batch": report.last_completed_batch,
            "report": summary(&report),
          }),
        );
        let origin = OutputOrigin::from_envelope(envelope, &self.handler_id);
        return Ok(HandlerOutput::orchestrator(origin, vec![event], vec![])?);
      }
      Err(e) => return Err(HandlerError::failed(e.to_string())),
    };

    let event = DynPayload::event("workflow.completed", summary(&report));
    let origin = OutputOrigin::from_envelope(envelope, &self.handler_id);
    Ok(HandlerOutput::orchestrator(origin, vec![event], vec![])?)
  }
}
