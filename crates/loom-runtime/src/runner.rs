//! Envelope runner with channel-based delivery.
//!
//! The `EnvelopeRunner` owns an mpsc channel of inbound envelopes, routes each one
//! through the frozen [`HandlerRegistry`] and publishes what the handler emits.

use std::sync::Arc;

use loom_bus::{BusMessage, EventPublisher};
use loom_handler::{HandlerError, HandlerOutput, HandlerRegistry, NodeKind};
use loom_message::{DynPayload, Envelope};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::RunnerConfig;
use crate::error::RuntimeError;

/// Routes envelopes to handlers, one at a time.
///
/// # Usage
///
/// ```ignore
/// let runner = EnvelopeRunner::new(registry, publisher);
///
/// // Hand the sender to whatever produces envelopes
/// let sender = runner.sender();
///
/// let cancel = CancellationToken::new();
/// runner.start(cancel).await?;
/// ```
pub struct EnvelopeRunner {
  sender: mpsc::Sender<Envelope<DynPayload>>,
  receiver: mpsc::Receiver<Envelope<DynPayload>>,
  router: Router,
}

impl EnvelopeRunner {
  pub fn new(registry: Arc<HandlerRegistry>, publisher: Arc<dyn EventPublisher>) -> Self {
    Self::with_config(registry, publisher, RunnerConfig::default())
  }

  pub fn with_config(
    registry: Arc<HandlerRegistry>,
    publisher: Arc<dyn EventPublisher>,
    config: RunnerConfig,
  ) -> Self {
    let (sender, receiver) = mpsc::channel(config.buffer_size.max(1));
    Self {
      sender,
      receiver,
      router: Router {
        registry,
        publisher,
      },
    }
  }

  pub fn sender(&self) -> mpsc::Sender<Envelope<DynPayload>> {
    self.sender.clone()
  }

  pub fn registry(&self) -> &HandlerRegistry {
    &self.router.registry
  }

  /// Queue an envelope for the execution loop.
  pub async fn run(&self, envelope: Envelope<DynPayload>) -> Result<(), RuntimeError> {
    self
      .sender
      .send(envelope)
      .await
      .map_err(|_| RuntimeError::ChannelClosed)
  }

  /// Route and handle one envelope outside the loop, then publish its output.
  pub async fn process(
    &self,
    envelope: Envelope<DynPayload>,
  ) -> Result<HandlerOutput<serde_json::Value>, RuntimeError> {
    self.router.process(envelope).await
  }

  /// Start the execution loop.
  ///
  /// Runs until the cancellation token fires or every sender handed out by
  /// [`sender`](Self::sender) is dropped. Handler and routing failures are logged
  /// and the loop moves on; a handler that breaks its output contract stops the
  /// runner.
  pub async fn start(self, cancel: CancellationToken) -> Result<(), RuntimeError> {
    let EnvelopeRunner {
      sender,
      mut receiver,
      router,
    } = self;
    drop(sender);
    info!(handlers = router.registry.len(), "envelope_runner_started");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("envelope_runner_cancelled");
          break;
        }
        envelope = receiver.recv() => {
          let Some(envelope) = envelope else {
            info!("envelope_runner_channel_closed");
            break;
          };
          match router.process(envelope).await {
            Ok(_) => {}
            Err(e) if e.is_fatal() => {
              error!(error = %e, "envelope_runner_halted");
              return Err(e);
            }
            Err(e) => warn!(error = %e, "envelope_failed"),
          }
        }
      }
    }
    Ok(())
  }
}

struct Router {
  registry: Arc<HandlerRegistry>,
  publisher: Arc<dyn EventPublisher>,
}

impl Router {
  /// Output events become child envelopes of the input; output intents are
  /// published as child intent envelopes at the intent's priority.
  #[instrument(
    name = "envelope_process",
    skip(self, envelope),
    fields(
      envelope_id = %envelope.envelope_id(),
      payload_type = %envelope.payload().payload_type,
    )
  )]
  async fn process(
    &self,
    envelope: Envelope<DynPayload>,
  ) -> Result<HandlerOutput<serde_json::Value>, RuntimeError> {
    let candidate = self.registry.resolve(&envelope)?;
    let handler = candidate.handler;
    let handler_id = handler.handler_id().to_string();
    debug!(handler_id = %handler_id, tier = %candidate.tier, "envelope_routed");

    let output = handler
      .handle(&envelope)
      .await
      .map_err(|source| match source {
        HandlerError::Shape(violation) => RuntimeError::Shape {
          handler_id: handler_id.clone(),
          source: violation,
        },
        source => RuntimeError::Handler {
          handler_id: handler_id.clone(),
          source,
        },
      })?;

    output
      .expect_kind(handler.node_kind())
      .map_err(|source| RuntimeError::Shape {
        handler_id: handler_id.clone(),
        source,
      })?;

    self.publish_output(&envelope, &output).await?;
    info!(
      handler_id = %handler_id,
      node_kind = %output.node_kind(),
      events = output.events().len(),
      intents = output.intents().len(),
      "envelope_handled"
    );
    Ok(output)
  }

  async fn publish_output(
    &self,
    envelope: &Envelope<DynPayload>,
    output: &HandlerOutput<serde_json::Value>,
  ) -> Result<(), RuntimeError> {
    // Reducers publish their own transition effects.
    if output.node_kind() == NodeKind::Reducer {
      return Ok(());
    }
    for event in output.events() {
      let child = envelope.child(event.clone());
      self.publisher.publish(BusMessage::from(child)).await?;
    }
    for intent in output.intents() {
      let child = envelope
        .child(intent.clone())
        .with_priority(intent.priority());
      self.publisher.publish(BusMessage::from(child)).await?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use loom_bus::RecordingPublisher;
  use loom_handler::{Handler, OutputOrigin, RoutingKey, ShapeViolation};
  use serde_json::json;

  /// Declares `kind` but may answer with any output shape.
  struct StubHandler {
    id: &'static str,
    kind: NodeKind,
    reply: NodeKind,
  }

  #[async_trait]
  impl Handler for StubHandler {
    fn handler_id(&self) -> &str {
      self.id
    }

    fn node_kind(&self) -> NodeKind {
      self.kind
    }

    async fn handle(
      &self,
      envelope: &Envelope<DynPayload>,
    ) -> Result<HandlerOutput<serde_json::Value>, HandlerError> {
      let origin = OutputOrigin::from_envelope(envelope, self.id);
      let body = envelope.payload().body.clone();
      let output = match self.reply {
        NodeKind::Compute => HandlerOutput::compute(origin, body)?,
        NodeKind::Effect => {
          HandlerOutput::effect(origin, vec![DynPayload::event("email.sent", body)])?
        }
        // An orchestrator output with neither events nor intents.
        NodeKind::Orchestrator => HandlerOutput::orchestrator(origin, vec![], vec![])?,
        _ => return Err(HandlerError::failed("unsupported reply")),
      };
      Ok(output)
    }
  }

  fn runner(handlers: Vec<(StubHandler, &str)>) -> (EnvelopeRunner, Arc<RecordingPublisher>) {
    let mut builder = HandlerRegistry::builder();
    for (handler, payload_type) in handlers {
      builder
        .register(Arc::new(handler), [RoutingKey::payload_type(payload_type)])
        .unwrap();
    }
    let publisher = Arc::new(RecordingPublisher::new());
    let runner = EnvelopeRunner::with_config(
      Arc::new(builder.freeze()),
      publisher.clone(),
      RunnerConfig { buffer_size: 4 },
    );
    (runner, publisher)
  }

  fn envelope(payload_type: &str) -> Envelope<DynPayload> {
    Envelope::new(DynPayload::command(payload_type, json!({"to": "a@example.com"})))
  }

  #[tokio::test]
  async fn test_process_compute() {
    let (runner, publisher) = runner(vec![(
      StubHandler {
        id: "pricing",
        kind: NodeKind::Compute,
        reply: NodeKind::Compute,
      },
      "price.quote",
    )]);

    let output = runner.process(envelope("price.quote")).await.unwrap();
    assert_eq!(output.handler_id(), "pricing");
    assert_eq!(output.result(), Some(&json!({"to": "a@example.com"})));
    assert!(publisher.messages().is_empty());
  }

  #[tokio::test]
  async fn test_effect_events_published_as_children() {
    let (runner, publisher) = runner(vec![(
      StubHandler {
        id: "mailer",
        kind: NodeKind::Effect,
        reply: NodeKind::Effect,
      },
      "email.send",
    )]);
    let input = envelope("email.send");
    let input_id = input.envelope_id();

    runner.process(input).await.unwrap();

    let messages = publisher.messages();
    assert_eq!(messages.len(), 1);
    match &messages[0] {
      BusMessage::Event { envelope } => {
        assert_eq!(envelope.payload().payload_type, "email.sent");
        assert_eq!(envelope.causation_id(), Some(input_id));
        assert_eq!(envelope.correlation_id(), Some(input_id));
      }
      other => panic!("expected event, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_wrong_output_kind_is_fatal() {
    let (runner, publisher) = runner(vec![(
      StubHandler {
        id: "mailer",
        kind: NodeKind::Effect,
        reply: NodeKind::Compute,
      },
      "email.send",
    )]);

    let err = runner.process(envelope("email.send")).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, RuntimeError::Shape { ref handler_id, .. } if handler_id == "mailer"));
    assert!(publisher.messages().is_empty());
  }

  #[tokio::test]
  async fn test_loop_skips_unroutable_and_stops_when_senders_drop() {
    let (runner, publisher) = runner(vec![(
      StubHandler {
        id: "mailer",
        kind: NodeKind::Effect,
        reply: NodeKind::Effect,
      },
      "email.send",
    )]);
    let sender = runner.sender();
    sender.send(envelope("unknown.type")).await.unwrap();
    sender.send(envelope("email.send")).await.unwrap();
    drop(sender);

    runner.start(CancellationToken::new()).await.unwrap();
    assert_eq!(publisher.messages().len(), 1);
  }

  #[tokio::test]
  async fn test_loop_halts_on_shape_violation() {
    let (runner, _) = runner(vec![(
      StubHandler {
        id: "mailer",
        kind: NodeKind::Effect,
        reply: NodeKind::Compute,
      },
      "email.send",
    )]);
    runner.run(envelope("email.send")).await.unwrap();

    let sender = runner.sender();
    let result = runner.start(CancellationToken::new()).await;
    assert!(matches!(result, Err(RuntimeError::Shape { .. })));
    drop(sender);
  }

  #[tokio::test]
  async fn test_shape_violation_reported_by_handler_is_fatal() {
    let (runner, publisher) = runner(vec![(
      StubHandler {
        id: "fanout",
        kind: NodeKind::Orchestrator,
        reply: NodeKind::Orchestrator,
      },
      "order.placed",
    )]);

    let err = runner.process(envelope("order.placed")).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
      err,
      RuntimeError::Shape {
        ref handler_id,
        source: ShapeViolation::MissingRequiredField { kind: NodeKind::Orchestrator, .. },
      } if handler_id == "fanout"
    ));

    // The loop halts instead of moving on to the next envelope.
    let sender = runner.sender();
    sender.send(envelope("order.placed")).await.unwrap();
    sender.send(envelope("order.placed")).await.unwrap();
    let result = runner.start(CancellationToken::new()).await;
    assert!(matches!(result, Err(RuntimeError::Shape { .. })));
    assert!(publisher.messages().is_empty());
  }

  #[tokio::test]
  async fn test_cancellation_stops_loop() {
    let (runner, _) = runner(vec![]);
    let _sender = runner.sender();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(runner.start(cancel.clone()));

    cancel.cancel();
    assert!(handle.await.unwrap().is_ok());
  }
}
