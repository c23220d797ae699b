use async_trait::async_trait;
use loom_message::{DynPayload, Envelope};

use crate::error::HandlerError;
use crate::output::{HandlerOutput, NodeKind};

/// A unit of processing that receives envelopes from the registry.
#[async_trait]
pub trait Handler: Send + Sync {
  /// Stable identifier, unique within a registry.
  fn handler_id(&self) -> &str;

  /// The role this handler plays. Its outputs must match this kind.
  fn node_kind(&self) -> NodeKind;

  async fn handle(
    &self,
    envelope: &Envelope<DynPayload>,
  ) -> Result<HandlerOutput<serde_json::Value>, HandlerError>;
}
