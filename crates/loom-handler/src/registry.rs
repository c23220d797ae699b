use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use loom_message::{Envelope, Payload};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RegistrationError, RoutingError};
use crate::handler::Handler;
use crate::topic::topic_matches;

/// A key a handler can be routed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RoutingKey {
  /// Exact payload type name.
  PayloadType(String),
  /// Dotted topic pattern, see [`topic_matches`].
  Topic(String),
  Operation(String),
}

impl RoutingKey {
  pub fn payload_type(name: impl Into<String>) -> Self {
    Self::PayloadType(name.into())
  }

  pub fn topic(pattern: impl Into<String>) -> Self {
    Self::Topic(pattern.into())
  }

  pub fn operation(name: impl Into<String>) -> Self {
    Self::Operation(name.into())
  }
}

impl fmt::Display for RoutingKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RoutingKey::PayloadType(name) => write!(f, "payload type '{}'", name),
      RoutingKey::Topic(pattern) => write!(f, "topic '{}'", pattern),
      RoutingKey::Operation(name) => write!(f, "operation '{}'", name),
    }
  }
}

/// Routing tiers, highest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
  PayloadType,
  Topic,
  Operation,
  Default,
}

impl MatchTier {
  const ORDER: [MatchTier; 4] = [
    MatchTier::PayloadType,
    MatchTier::Topic,
    MatchTier::Operation,
    MatchTier::Default,
  ];
}

impl fmt::Display for MatchTier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      MatchTier::PayloadType => "payload type",
      MatchTier::Topic => "topic",
      MatchTier::Operation => "operation",
      MatchTier::Default => "default",
    };
    f.write_str(name)
  }
}

/// A handler selected for an envelope, with the tier that selected it.
#[derive(Clone)]
pub struct Candidate {
  pub handler: Arc<dyn Handler>,
  pub tier: MatchTier,
}

impl fmt::Debug for Candidate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Candidate")
      .field("handler_id", &self.handler.handler_id())
      .field("tier", &self.tier)
      .finish()
  }
}

#[derive(Default)]
struct Routes {
  handlers: Vec<Arc<dyn Handler>>,
  by_payload_type: HashMap<String, Vec<usize>>,
  /// Kept in registration order; patterns are matched one by one.
  by_topic: Vec<(String, usize)>,
  by_operation: HashMap<String, Vec<usize>>,
  default: Option<usize>,
}

/// Mutable registration phase. Consumed by [`freeze`](Self::freeze).
#[derive(Default)]
pub struct HandlerRegistryBuilder {
  routes: Routes,
  ids: HashMap<String, usize>,
}

impl HandlerRegistryBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a handler under one or more routing keys.
  pub fn register(
    &mut self,
    handler: Arc<dyn Handler>,
    keys: impl IntoIterator<Item = RoutingKey>,
  ) -> Result<&mut Self, RegistrationError> {
    let handler_id = handler.handler_id().to_string();
    if self.ids.contains_key(&handler_id) {
      return Err(RegistrationError::DuplicateHandler { handler_id });
    }

    let mut seen = HashSet::new();
    let keys: Vec<RoutingKey> = keys.into_iter().collect();
    for key in &keys {
      if !seen.insert(key) {
        return Err(RegistrationError::DuplicateRoutingKey {
          handler_id,
          key: key.clone(),
        });
      }
    }

    let index = self.push(handler);
    for key in keys {
      debug!(handler_id = %handler_id, key = %key, "handler_registered");
      match key {
        RoutingKey::PayloadType(name) => {
          self.routes.by_payload_type.entry(name).or_default().push(index)
        }
        RoutingKey::Topic(pattern) => self.routes.by_topic.push((pattern, index)),
        RoutingKey::Operation(name) => {
          self.routes.by_operation.entry(name).or_default().push(index)
        }
      }
    }
    Ok(self)
  }

  /// Set the handler used when no routing key matches.
  ///
  /// The handler may also be registered under keys; it is stored once either way.
  /// A different instance reusing a registered handler id is rejected.
  pub fn set_default(&mut self, handler: Arc<dyn Handler>) -> Result<&mut Self, RegistrationError> {
    let index = match self.ids.get(handler.handler_id()) {
      Some(&index) if same_instance(&self.routes.handlers[index], &handler) => index,
      Some(_) => {
        return Err(RegistrationError::DuplicateHandler {
          handler_id: handler.handler_id().to_string(),
        });
      }
      None => self.push(handler),
    };
    self.routes.default = Some(index);
    Ok(self)
  }

  pub fn freeze(self) -> HandlerRegistry {
    info!(handlers = self.routes.handlers.len(), "handler_registry_frozen");
    HandlerRegistry {
      routes: self.routes,
    }
  }

  fn push(&mut self, handler: Arc<dyn Handler>) -> usize {
    let index = self.routes.handlers.len();
    self.ids.insert(handler.handler_id().to_string(), index);
    self.routes.handlers.push(handler);
    index
  }
}

/// Read-only routing table. Safe to share across tasks without locking.
pub struct HandlerRegistry {
  routes: Routes,
}

fn same_instance(a: &Arc<dyn Handler>, b: &Arc<dyn Handler>) -> bool {
  std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl HandlerRegistry {
  pub fn builder() -> HandlerRegistryBuilder {
    HandlerRegistryBuilder::new()
  }

  /// All matching handlers, ordered by tier then registration order.
  ///
  /// A handler matching in several tiers appears once, at its highest tier.
  pub fn route<P: Payload>(&self, envelope: &Envelope<P>) -> Result<Vec<Candidate>, RoutingError> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for tier in MatchTier::ORDER {
      for index in self.matches(tier, envelope) {
        if seen.insert(index) {
          candidates.push(Candidate {
            handler: self.routes.handlers[index].clone(),
            tier,
          });
        }
      }
    }

    if candidates.is_empty() {
      return Err(RoutingError::NoHandler {
        payload_type: envelope.payload_type().to_string(),
      });
    }

    debug!(
      envelope_id = %envelope.envelope_id(),
      payload_type = %envelope.payload_type(),
      candidates = candidates.len(),
      "envelope_routed"
    );
    Ok(candidates)
  }

  /// The single handler from the highest tier with any match.
  pub fn resolve<P: Payload>(&self, envelope: &Envelope<P>) -> Result<Candidate, RoutingError> {
    for tier in MatchTier::ORDER {
      let matched = self.matches(tier, envelope);
      match matched.as_slice() {
        [] => continue,
        [index] => {
          return Ok(Candidate {
            handler: self.routes.handlers[*index].clone(),
            tier,
          });
        }
        many => {
          return Err(RoutingError::AmbiguousMatch {
            tier,
            handlers: many
              .iter()
              .map(|&i| self.routes.handlers[i].handler_id().to_string())
              .collect(),
          });
        }
      }
    }

    Err(RoutingError::NoHandler {
      payload_type: envelope.payload_type().to_string(),
    })
  }

  pub fn get(&self, handler_id: &str) -> Option<Arc<dyn Handler>> {
    self
      .routes
      .handlers
      .iter()
      .find(|h| h.handler_id() == handler_id)
      .cloned()
  }

  pub fn len(&self) -> usize {
    self.routes.handlers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.routes.handlers.is_empty()
  }

  fn matches<P: Payload>(&self, tier: MatchTier, envelope: &Envelope<P>) -> Vec<usize> {
    let mut matched = match tier {
      MatchTier::PayloadType => self
        .routes
        .by_payload_type
        .get(envelope.payload_type())
        .cloned()
        .unwrap_or_default(),
      MatchTier::Topic => match envelope.topic() {
        Some(topic) => self
          .routes
          .by_topic
          .iter()
          .filter(|(pattern, _)| topic_matches(pattern, topic))
          .map(|(_, index)| *index)
          .collect(),
        None => Vec::new(),
      },
      MatchTier::Operation => envelope
        .operation()
        .and_then(|op| self.routes.by_operation.get(op))
        .cloned()
        .unwrap_or_default(),
      MatchTier::Default => self.routes.default.into_iter().collect(),
    };
    // Two patterns of one handler can both match a topic.
    let mut seen = HashSet::new();
    matched.retain(|index| seen.insert(*index));
    matched
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::HandlerError;
  use crate::output::{HandlerOutput, NodeKind, OutputOrigin};
  use async_trait::async_trait;
  use loom_message::DynPayload;
  use serde_json::json;

  struct NamedHandler {
    id: String,
  }

  #[async_trait]
  impl Handler for NamedHandler {
    fn handler_id(&self) -> &str {
      &self.id
    }

    fn node_kind(&self) -> NodeKind {
      NodeKind::Compute
    }

    async fn handle(
      &self,
      envelope: &Envelope<DynPayload>,
    ) -> Result<HandlerOutput<serde_json::Value>, HandlerError> {
      let origin = OutputOrigin::from_envelope(envelope, &self.id);
      Ok(HandlerOutput::compute(origin, json!(self.id))?)
    }
  }

  fn handler(id: &str) -> Arc<dyn Handler> {
    Arc::new(NamedHandler { id: id.to_string() })
  }

  fn envelope(payload_type: &str) -> Envelope<DynPayload> {
    Envelope::new(DynPayload::event(payload_type, json!({})))
  }

  fn ids(candidates: &[Candidate]) -> Vec<&str> {
    candidates.iter().map(|c| c.handler.handler_id()).collect()
  }

  #[test]
  fn test_route_orders_by_tier() {
    let mut builder = HandlerRegistry::builder();
    builder
      .register(handler("by-op"), [RoutingKey::operation("create")])
      .unwrap()
      .register(handler("by-topic"), [RoutingKey::topic("orders.*")])
      .unwrap()
      .register(handler("by-type"), [RoutingKey::payload_type("order.created")])
      .unwrap();
    builder.set_default(handler("fallback")).unwrap();
    let registry = builder.freeze();

    let env = envelope("order.created")
      .with_topic("orders.created")
      .with_operation("create");
    let candidates = registry.route(&env).unwrap();

    assert_eq!(ids(&candidates), vec!["by-type", "by-topic", "by-op", "fallback"]);
    assert_eq!(candidates[0].tier, MatchTier::PayloadType);
    assert_eq!(candidates[3].tier, MatchTier::Default);
  }

  #[test]
  fn test_route_falls_back_to_default() {
    let mut builder = HandlerRegistry::builder();
    builder.set_default(handler("fallback")).unwrap();
    let registry = builder.freeze();

    let candidates = registry.route(&envelope("unknown")).unwrap();
    assert_eq!(ids(&candidates), vec!["fallback"]);
    assert_eq!(candidates[0].tier, MatchTier::Default);
  }

  #[test]
  fn test_no_handler() {
    let registry = HandlerRegistry::builder().freeze();
    assert_eq!(
      registry.route(&envelope("unknown")).unwrap_err(),
      RoutingError::NoHandler {
        payload_type: "unknown".to_string()
      }
    );
    assert!(registry.resolve(&envelope("unknown")).is_err());
  }

  #[test]
  fn test_handler_listed_once_at_highest_tier() {
    let mut builder = HandlerRegistry::builder();
    builder
      .register(
        handler("both"),
        [RoutingKey::payload_type("order.created"), RoutingKey::topic("#")],
      )
      .unwrap();
    let registry = builder.freeze();

    let env = envelope("order.created").with_topic("orders.created");
    let candidates = registry.route(&env).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].tier, MatchTier::PayloadType);
  }

  #[test]
  fn test_resolve_ambiguous_tier() {
    let mut builder = HandlerRegistry::builder();
    builder
      .register(handler("a"), [RoutingKey::payload_type("order.created")])
      .unwrap()
      .register(handler("b"), [RoutingKey::payload_type("order.created")])
      .unwrap()
      .register(handler("c"), [RoutingKey::topic("orders.#")])
      .unwrap();
    let registry = builder.freeze();

    let err = registry.resolve(&envelope("order.created")).unwrap_err();
    assert_eq!(
      err,
      RoutingError::AmbiguousMatch {
        tier: MatchTier::PayloadType,
        handlers: vec!["a".to_string(), "b".to_string()]
      }
    );

    let env = envelope("order.shipped").with_topic("orders.shipped");
    let resolved = registry.resolve(&env).unwrap();
    assert_eq!(resolved.handler.handler_id(), "c");
    assert_eq!(resolved.tier, MatchTier::Topic);
  }

  #[test]
  fn test_duplicate_registrations_rejected() {
    let mut builder = HandlerRegistry::builder();
    let err = builder
      .register(
        handler("a"),
        [RoutingKey::operation("create"), RoutingKey::operation("create")],
      )
      .err();
    assert_eq!(
      err,
      Some(RegistrationError::DuplicateRoutingKey {
        handler_id: "a".to_string(),
        key: RoutingKey::operation("create")
      })
    );

    builder.register(handler("a"), [RoutingKey::operation("create")]).unwrap();
    assert!(matches!(
      builder.register(handler("a"), [RoutingKey::operation("update")]),
      Err(RegistrationError::DuplicateHandler { .. })
    ));
  }

  #[test]
  fn test_default_reuses_registered_instance_only() {
    let mut builder = HandlerRegistry::builder();
    let fallback = handler("fallback");
    builder
      .register(fallback.clone(), [RoutingKey::payload_type("ping")])
      .unwrap();
    builder.set_default(fallback).unwrap();

    assert!(matches!(
      builder.set_default(handler("fallback")),
      Err(RegistrationError::DuplicateHandler { ref handler_id }) if handler_id == "fallback"
    ));

    let registry = builder.freeze();
    assert_eq!(registry.len(), 1);
    let candidate = registry.resolve(&envelope("unrouted")).unwrap();
    assert_eq!(candidate.tier, MatchTier::Default);
  }

  #[tokio::test]
  async fn test_frozen_registry_is_shareable() {
    let mut builder = HandlerRegistry::builder();
    builder
      .register(handler("a"), [RoutingKey::payload_type("ping")])
      .unwrap();
    let registry = Arc::new(builder.freeze());

    let tasks: Vec<_> = (0..4)
      .map(|_| {
        let registry = registry.clone();
        tokio::spawn(async move {
          let env = envelope("ping");
          let candidate = registry.resolve(&env).unwrap();
          candidate.handler.handle(&env).await.unwrap()
        })
      })
      .collect();

    for task in tasks {
      let output = task.await.unwrap();
      assert_eq!(output.result(), Some(&json!("a")));
    }
    assert_eq!(registry.len(), 1);
    assert!(registry.get("a").is_some());
  }
}
