use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::PublishError;
use crate::events::{BusMessage, ExecutionEvent};

/// The bus binding. Safe for concurrent use once constructed.
#[async_trait]
pub trait EventPublisher: Send + Sync {
  async fn publish(&self, message: BusMessage) -> Result<(), PublishError>;
}

/// Discards every message.
#[derive(Debug, Clone, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
  async fn publish(&self, _message: BusMessage) -> Result<(), PublishError> {
    Ok(())
  }
}

/// Forwards messages to an unbounded channel.
///
/// Unbounded so a slow consumer never stalls workflow execution.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
  sender: mpsc::UnboundedSender<BusMessage>,
}

impl ChannelPublisher {
  pub fn new(sender: mpsc::UnboundedSender<BusMessage>) -> Self {
    Self { sender }
  }

  /// Create a publisher together with its receiving end.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<BusMessage>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
  async fn publish(&self, message: BusMessage) -> Result<(), PublishError> {
    self.sender.send(message).map_err(|_| PublishError::Closed)
  }
}

/// Keeps every published message in memory.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
  messages: Mutex<Vec<BusMessage>>,
}

impl RecordingPublisher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn messages(&self) -> Vec<BusMessage> {
    self
      .messages
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  pub fn execution_events(&self) -> Vec<ExecutionEvent> {
    self
      .messages()
      .into_iter()
      .filter_map(|m| match m {
        BusMessage::Execution(event) => Some(event),
        _ => None,
      })
      .collect()
  }

  pub fn clear(&self) {
    self
      .messages
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clear();
  }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
  async fn publish(&self, message: BusMessage) -> Result<(), PublishError> {
    self
      .messages
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(message);
    Ok(())
  }
}
