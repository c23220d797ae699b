//! Workflow execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use loom_bus::{EventPublisher, ExecutionEvent};
use loom_handler::HandlerOutput;
use loom_lease::LeaseHandle;
use loom_message::{Action, ActionType, Envelope, Intent, Priority};
use loom_workflow::{ExecutionMode, FailureRecoveryStrategy, WorkflowGraph};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::backoff::RetryPolicy;
use crate::dispatcher::LeaseDispatcher;
use crate::effect::EffectHandler;
use crate::error::{DispatchError, OrchestratorError};
use crate::orchestrator::Orchestrator;
use crate::report::{AttemptOutcome, AttemptRecord, NodeStatus, WorkflowReport};

/// A handle to a workflow execution.
///
/// Call `.wait()` to run the execution and get the report.
pub struct WorkflowExecution<'a> {
  orchestrator: &'a Orchestrator,
  graph: &'a WorkflowGraph,
  execution_id: String,
  correlation_id: Uuid,
  intents: HashMap<String, Intent>,
  cancel: CancellationToken,
}

impl<'a> WorkflowExecution<'a> {
  pub(crate) fn new(
    orchestrator: &'a Orchestrator,
    graph: &'a WorkflowGraph,
    execution_id: String,
    intents: HashMap<String, Intent>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      orchestrator,
      graph,
      execution_id,
      correlation_id: Uuid::new_v4(),
      intents,
      cancel,
    }
  }

  pub fn execution_id(&self) -> &str {
    &self.execution_id
  }

  /// Correlate published effect events with an upstream envelope.
  pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
    self.correlation_id = correlation_id;
    self
  }

  /// Run the workflow to completion.
  #[instrument(
    name = "workflow_execute",
    skip(self),
    fields(
      workflow_id = %self.graph.workflow_id(),
      execution_id = %self.execution_id,
    )
  )]
  pub async fn wait(self) -> Result<WorkflowReport, OrchestratorError> {
    info!(
      execution_id = %self.execution_id,
      workflow_id = %self.graph.workflow_id(),
      nodes = self.graph.nodes().len(),
      batches = self.graph.batches().len(),
      "workflow_started"
    );
    self
      .notify(ExecutionEvent::WorkflowStarted {
        execution_id: self.execution_id.clone(),
        workflow_id: self.graph.workflow_id().to_string(),
      })
      .await;

    let mut report = WorkflowReport::new(&self.execution_id, self.graph.workflow_id());
    let result = match self.validate_handlers() {
      Ok(()) => self.run_loop(&mut report).await,
      Err(e) => Err(e),
    };

    match &result {
      Ok(()) => {
        info!(execution_id = %self.execution_id, "workflow_completed");
        self
          .notify(ExecutionEvent::WorkflowCompleted {
            execution_id: self.execution_id.clone(),
          })
          .await;
      }
      Err(OrchestratorError::Cancelled) => {
        warn!(execution_id = %self.execution_id, "workflow_cancelled");
        self
          .notify(ExecutionEvent::WorkflowCancelled {
            execution_id: self.execution_id.clone(),
          })
          .await;
      }
      Err(OrchestratorError::Aborted { node_id, source, .. }) => {
        error!(
          execution_id = %self.execution_id,
          node_id = %node_id,
          error = %error_chain(source),
          "workflow_aborted"
        );
        self
          .notify(ExecutionEvent::WorkflowAborted {
            execution_id: self.execution_id.clone(),
            node_id: node_id.clone(),
            error: error_chain(source),
          })
          .await;
      }
      Err(e) => {
        error!(execution_id = %self.execution_id, error = %e, "workflow_failed");
      }
    }

    result.map(|()| report)
  }

  async fn run_loop(&self, report: &mut WorkflowReport) -> Result<(), OrchestratorError> {
    let definition = self.graph.definition();
    let policy = RetryPolicy::from_definition(definition);
    let mut action_ids: HashMap<String, Uuid> = HashMap::new();

    for (index, batch) in self.graph.batches().iter().enumerate() {
      if self.cancel.is_cancelled() {
        return Err(OrchestratorError::Cancelled);
      }

      if let Some(store) = &self.orchestrator.lease_store {
        self.orchestrator.lease.refresh(store.as_ref()).await?;
      }

      info!(
        execution_id = %self.execution_id,
        batch = index,
        nodes = ?batch,
        "batch_started"
      );
      self
        .notify(ExecutionEvent::BatchStarted {
          execution_id: self.execution_id.clone(),
          batch: index,
          node_ids: batch.clone(),
        })
        .await;

      let runs = batch
        .iter()
        .map(|node_id| self.node_run(node_id, &action_ids, policy))
        .collect::<Result<Vec<_>, _>>()?;

      let outcomes = match definition.execution_mode {
        ExecutionMode::Parallel => self.run_parallel(runs).await?,
        ExecutionMode::Sequential => run_sequential(runs).await,
      };

      let mut cancelled = false;
      let mut failure: Option<(String, DispatchError)> = None;
      for outcome in outcomes {
        if outcome.attempts.len() > 1 {
          report.retried.push(outcome.node_id.clone());
        }
        report.attempts.extend(outcome.attempts);

        let node_id = outcome.node_id;
        match outcome.result {
          NodeResult::Completed { action_id, output } => {
            self
              .notify(ExecutionEvent::NodeCompleted {
                execution_id: self.execution_id.clone(),
                node_id: node_id.clone(),
                events: output.events().len(),
              })
              .await;
            action_ids.insert(node_id.clone(), action_id);
            report.outputs.insert(node_id.clone(), output);
            report.node_status.insert(node_id, NodeStatus::Completed);
          }
          NodeResult::Skipped(e) => {
            warn!(execution_id = %self.execution_id, node_id = %node_id, error = %error_chain(&e), "node_skipped");
            self
              .notify(ExecutionEvent::NodeSkipped {
                execution_id: self.execution_id.clone(),
                node_id: node_id.clone(),
                error: error_chain(&e),
              })
              .await;
            report.skipped.push(node_id.clone());
            report.node_status.insert(node_id, NodeStatus::Skipped);
          }
          NodeResult::Superseded {
            action_id,
            stamped,
            current,
          } => {
            warn!(
              execution_id = %self.execution_id,
              node_id = %node_id,
              action_id = %action_id,
              stamped,
              current,
              "node_superseded"
            );
            self
              .notify(ExecutionEvent::NodeSuperseded {
                execution_id: self.execution_id.clone(),
                node_id: node_id.clone(),
                action_id,
                stamped,
                current,
              })
              .await;
            report.superseded.push(node_id.clone());
            report.node_status.insert(node_id, NodeStatus::Superseded);
          }
          NodeResult::Failed(e) => {
            error!(execution_id = %self.execution_id, node_id = %node_id, error = %error_chain(&e), "node_failed");
            self
              .notify(ExecutionEvent::NodeFailed {
                execution_id: self.execution_id.clone(),
                node_id: node_id.clone(),
                error: error_chain(&e),
              })
              .await;
            report.node_status.insert(node_id.clone(), NodeStatus::Failed);
            if failure.is_none() {
              failure = Some((node_id, e));
            }
          }
          NodeResult::Cancelled => cancelled = true,
        }
      }

      if cancelled || self.cancel.is_cancelled() {
        return Err(OrchestratorError::Cancelled);
      }
      if let Some((node_id, source)) = failure {
        return Err(OrchestratorError::Aborted {
          node_id,
          source,
          report: Box::new(report.clone()),
        });
      }
      report.last_completed_batch = Some(index);
    }

    Ok(())
  }

  /// Run every node of a batch as its own task and join them all.
  async fn run_parallel(&self, runs: Vec<NodeRun>) -> Result<Vec<NodeOutcome>, OrchestratorError> {
    let node_ids: Vec<String> = runs.iter().map(|r| r.node_id.clone()).collect();
    let handles: Vec<_> = runs
      .into_iter()
      .map(|run| tokio::spawn(run.run()))
      .collect();

    let joined = futures::future::join_all(handles);
    tokio::pin!(joined);
    let results = tokio::select! {
      results = &mut joined => Some(results),
      _ = self.cancel.cancelled() => None,
    };
    let Some(results) = results else {
      warn!(execution_id = %self.execution_id, "workflow cancelled during batch");
      // Tasks observe child tokens; wait for them so none outlives the execution.
      joined.await;
      return Err(OrchestratorError::Cancelled);
    };

    results
      .into_iter()
      .zip(node_ids)
      .map(|(result, node_id)| {
        result.map_err(|e| OrchestratorError::TaskJoin {
          node_id,
          message: e.to_string(),
        })
      })
      .collect()
  }

  fn node_run(
    &self,
    node_id: &str,
    action_ids: &HashMap<String, Uuid>,
    policy: RetryPolicy,
  ) -> Result<NodeRun, OrchestratorError> {
    let node = self.graph.node(node_id).ok_or_else(|| {
      OrchestratorError::InvalidWorkflow(loom_fsm::FsmError::invalid_definition(format!(
        "node '{}' not found in workflow",
        node_id
      )))
    })?;
    let handler = self.handler_for(node_id, &node.node_type)?;
    let definition = self.graph.definition();

    let intent = self.intents.get(node_id).cloned().unwrap_or_else(|| {
      Intent::new(
        Uuid::new_v4(),
        node_id,
        node.node_type.clone(),
        node.payload.clone(),
        Priority::default(),
      )
    });

    let dependencies = self
      .graph
      .upstream(node_id)
      .iter()
      .filter_map(|up| action_ids.get(up).copied())
      .collect();

    let deadline = node
      .timeout_ms
      .or(definition.timeout_ms)
      .or(self.orchestrator.config.default_deadline_ms)
      .map(Duration::from_millis);

    Ok(NodeRun {
      execution_id: self.execution_id.clone(),
      correlation_id: self.correlation_id,
      node_id: node_id.to_string(),
      node_type: node.node_type.clone(),
      action_type: node.action_type,
      intent,
      dependencies,
      deadline,
      strategy: definition.failure_recovery_strategy,
      policy,
      dispatcher: self.orchestrator.dispatcher.clone(),
      lease: self.orchestrator.lease.clone(),
      handler,
      publisher: self.orchestrator.publisher.clone(),
      cancel: self.cancel.child_token(),
    })
  }

  fn handler_for(
    &self,
    node_id: &str,
    node_type: &str,
  ) -> Result<Arc<dyn EffectHandler>, OrchestratorError> {
    self
      .orchestrator
      .handlers
      .get(node_type)
      .cloned()
      .ok_or_else(|| OrchestratorError::MissingHandler {
        node_id: node_id.to_string(),
        node_type: node_type.to_string(),
      })
  }

  /// Every node type must have a handler before the first batch runs.
  fn validate_handlers(&self) -> Result<(), OrchestratorError> {
    for node in self.graph.nodes() {
      self.handler_for(&node.node_id, &node.node_type)?;
    }
    Ok(())
  }

  async fn notify(&self, event: ExecutionEvent) {
    notify(self.orchestrator.publisher.as_ref(), event).await;
  }
}

/// Run nodes one at a time, stopping at the first failure.
async fn run_sequential(runs: Vec<NodeRun>) -> Vec<NodeOutcome> {
  let mut outcomes = Vec::with_capacity(runs.len());
  for run in runs {
    let outcome = run.run().await;
    let halt = matches!(outcome.result, NodeResult::Failed(_) | NodeResult::Cancelled);
    outcomes.push(outcome);
    if halt {
      break;
    }
  }
  outcomes
}

/// Execution events are best effort; a failing binding never fails the workflow.
async fn notify(publisher: &dyn EventPublisher, event: ExecutionEvent) {
  if let Err(e) = publisher.publish(event.into()).await {
    warn!(error = %e, "execution_event_dropped");
  }
}

fn error_chain(error: &DispatchError) -> String {
  let mut message = error.to_string();
  let mut source = std::error::Error::source(error);
  while let Some(cause) = source {
    message.push_str(": ");
    message.push_str(&cause.to_string());
    source = cause.source();
  }
  message
}

enum NodeResult {
  Completed {
    action_id: Uuid,
    output: HandlerOutput<serde_json::Value>,
  },
  Skipped(DispatchError),
  Superseded {
    action_id: Uuid,
    stamped: u64,
    current: u64,
  },
  Failed(DispatchError),
  Cancelled,
}

struct NodeOutcome {
  node_id: String,
  attempts: Vec<AttemptRecord>,
  result: NodeResult,
}

/// Everything one node needs to run on its own task.
struct NodeRun {
  execution_id: String,
  correlation_id: Uuid,
  node_id: String,
  node_type: String,
  action_type: ActionType,
  intent: Intent,
  dependencies: Vec<Uuid>,
  deadline: Option<Duration>,
  strategy: FailureRecoveryStrategy,
  policy: RetryPolicy,
  dispatcher: LeaseDispatcher,
  lease: LeaseHandle,
  handler: Arc<dyn EffectHandler>,
  publisher: Arc<dyn EventPublisher>,
  cancel: CancellationToken,
}

impl NodeRun {
  #[instrument(
    name = "node_execute",
    skip(self),
    fields(execution_id = %self.execution_id, node_id = %self.node_id)
  )]
  async fn run(self) -> NodeOutcome {
    let mut attempts = Vec::new();
    let mut attempt = 1u32;

    let result = loop {
      if self.cancel.is_cancelled() {
        break NodeResult::Cancelled;
      }

      // A retry is a new Action with a fresh stamp.
      let action = match self.dispatcher.dispatch_with(
        &self.intent,
        &self.lease,
        self.action_type,
        &self.node_type,
        self.dependencies.clone(),
      ) {
        Ok(action) => action,
        Err(e) => break NodeResult::Failed(e),
      };

      info!(
        execution_id = %self.execution_id,
        node_id = %self.node_id,
        action_id = %action.action_id(),
        lease_id = %action.lease_id(),
        epoch = action.epoch(),
        attempt,
        "action_dispatched"
      );
      notify(
        self.publisher.as_ref(),
        ExecutionEvent::ActionDispatched {
          execution_id: self.execution_id.clone(),
          node_id: self.node_id.clone(),
          action_id: action.action_id(),
          lease_id: action.lease_id(),
          epoch: action.epoch(),
          attempt,
        },
      )
      .await;

      let started = Instant::now();
      let result = tokio::select! {
        result = self.dispatcher.execute(&action, &self.lease, self.handler.as_ref(), self.deadline) => result,
        _ = self.cancel.cancelled() => Err(DispatchError::Cancelled),
      };
      attempts.push(self.record(&action, attempt, &result, started));

      let error = match result {
        Ok(output) => match self.publish_events(&action, &output).await {
          Ok(()) => {
            break NodeResult::Completed {
              action_id: action.action_id(),
              output,
            };
          }
          Err(e) => break NodeResult::Failed(e),
        },
        Err(DispatchError::StaleEpoch {
          action_id,
          stamped,
          current,
        }) => {
          break NodeResult::Superseded {
            action_id,
            stamped,
            current,
          };
        }
        Err(DispatchError::Cancelled) => break NodeResult::Cancelled,
        Err(e) if !e.is_recoverable() => break NodeResult::Failed(e),
        Err(e) => e,
      };

      match self.strategy {
        FailureRecoveryStrategy::Retry if self.policy.allows_retry(attempt) => {
          let delay = self.policy.delay(attempt);
          warn!(
            execution_id = %self.execution_id,
            node_id = %self.node_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error_chain(&error),
            "node_retry_scheduled"
          );
          notify(
            self.publisher.as_ref(),
            ExecutionEvent::NodeRetryScheduled {
              execution_id: self.execution_id.clone(),
              node_id: self.node_id.clone(),
              attempt,
              delay_ms: delay.as_millis() as u64,
              error: error_chain(&error),
            },
          )
          .await;

          tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.cancel.cancelled() => break NodeResult::Cancelled,
          }
          attempt += 1;
        }
        FailureRecoveryStrategy::Skip => break NodeResult::Skipped(error),
        // Abort, or retries exhausted.
        _ => break NodeResult::Failed(error),
      }
    };

    NodeOutcome {
      node_id: self.node_id,
      attempts,
      result,
    }
  }

  fn record(
    &self,
    action: &Action,
    attempt: u32,
    result: &Result<HandlerOutput<serde_json::Value>, DispatchError>,
    started: Instant,
  ) -> AttemptRecord {
    let outcome = match result {
      Ok(_) => AttemptOutcome::Succeeded,
      Err(DispatchError::Timeout { deadline_ms, .. }) => AttemptOutcome::TimedOut {
        deadline_ms: *deadline_ms,
      },
      Err(DispatchError::StaleEpoch { current, .. }) => AttemptOutcome::Stale { current: *current },
      Err(DispatchError::Cancelled) => AttemptOutcome::Cancelled,
      Err(e) => AttemptOutcome::Failed {
        error: error_chain(e),
      },
    };

    AttemptRecord {
      node_id: self.node_id.clone(),
      attempt,
      action_id: action.action_id(),
      lease_id: action.lease_id(),
      epoch: action.epoch(),
      outcome,
      elapsed_ms: started.elapsed().as_millis() as u64,
    }
  }

  /// Publish the effect's events, caused by the action that produced them.
  async fn publish_events(
    &self,
    action: &Action,
    output: &HandlerOutput<serde_json::Value>,
  ) -> Result<(), DispatchError> {
    for event in output.events() {
      let envelope = Envelope::new(event.clone())
        .with_correlation_id(self.correlation_id)
        .with_causation_id(action.action_id())
        .with_priority(action.priority());
      self.publisher.publish(envelope.into()).await?;
    }
    Ok(())
  }
}
