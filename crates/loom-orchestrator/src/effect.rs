use async_trait::async_trait;
use loom_handler::{HandlerError, HandlerOutput};
use loom_message::Action;

/// Executes the side effect behind an Action.
///
/// Implementations must return an effect-shaped output.
#[async_trait]
pub trait EffectHandler: Send + Sync {
  async fn execute(&self, action: &Action) -> Result<HandlerOutput<serde_json::Value>, HandlerError>;
}
