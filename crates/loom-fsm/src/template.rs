//! Intent payload rendering.
//!
//! Transition actions describe their Intent payloads as minijinja templates. The
//! event payload is the template context, so fields are referenced directly:
//!
//! ```json
//! { "order_id": "{{ order.id }}", "amount": "{{ amount }}", "note": "paid by {{ payer | title }}" }
//! ```
//!
//! Rendering produces strings, which are then coerced to JSON values according to
//! the action's `payload_schema`:
//! - `"amount"` (schema: number) → `12.5`
//! - `"order_id"` (no schema entry) → `"A-17"`
//!
//! Both steps are pure; the same inputs always render the same payload.

use std::collections::BTreeMap;

use minijinja::{Environment, Value};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::FsmError;

/// JSON types an intent payload field can be coerced to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaType {
  #[default]
  String,
  Number,
  Integer,
  Boolean,
  Null,
  Array,
  Object,
}

/// Render every template in `fields` against `context`.
pub fn render_payload(
  fields: &BTreeMap<String, String>,
  context: &serde_json::Value,
) -> Result<BTreeMap<String, String>, FsmError> {
  let env = Environment::new();

  // Non-object payloads are exposed as `value` so templates can still reach them.
  let context = if context.is_object() {
    context.clone()
  } else {
    json!({ "value": context })
  };
  let ctx_value = Value::from_serialize(&context);

  let mut rendered = BTreeMap::new();
  for (field, template) in fields {
    let value = env
      .render_str(template, ctx_value.clone())
      .map_err(|e| FsmError::TemplateResolution {
        field: field.clone(),
        message: e.to_string(),
      })?;
    rendered.insert(field.clone(), value);
  }

  Ok(rendered)
}

/// Coerce rendered strings into a JSON object according to `schema`.
pub fn coerce_payload(
  rendered: &BTreeMap<String, String>,
  schema: &BTreeMap<String, SchemaType>,
) -> Result<serde_json::Value, FsmError> {
  let mut result = serde_json::Map::new();

  for (field, value) in rendered {
    let schema_type = schema.get(field).copied().unwrap_or_default();
    result.insert(field.clone(), coerce_value(field, value, schema_type)?);
  }

  Ok(serde_json::Value::Object(result))
}

fn coerce_value(
  field: &str,
  value: &str,
  schema_type: SchemaType,
) -> Result<serde_json::Value, FsmError> {
  let mismatch = |expected: &str| FsmError::TemplateResolution {
    field: field.to_string(),
    message: format!("expected {}, got '{}'", expected, value),
  };

  match schema_type {
    SchemaType::String => Ok(serde_json::Value::String(value.to_string())),

    SchemaType::Number => value
      .parse::<f64>()
      .ok()
      .and_then(serde_json::Number::from_f64)
      .map(serde_json::Value::Number)
      .ok_or_else(|| mismatch("number")),

    SchemaType::Integer => value
      .parse::<i64>()
      .map(|n| serde_json::Value::Number(n.into()))
      .map_err(|_| mismatch("integer")),

    SchemaType::Boolean => match value.to_lowercase().as_str() {
      "true" => Ok(serde_json::Value::Bool(true)),
      "false" => Ok(serde_json::Value::Bool(false)),
      _ => Err(mismatch("boolean")),
    },

    SchemaType::Null => {
      if value.is_empty() || value == "null" {
        Ok(serde_json::Value::Null)
      } else {
        Err(mismatch("null"))
      }
    }

    SchemaType::Array => match serde_json::from_str(value) {
      Ok(parsed @ serde_json::Value::Array(_)) => Ok(parsed),
      _ => Err(mismatch("array")),
    },

    SchemaType::Object => match serde_json::from_str(value) {
      Ok(parsed @ serde_json::Value::Object(_)) => Ok(parsed),
      _ => Err(mismatch("object")),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  #[test]
  fn test_render_from_event_payload() {
    let templates = fields(&[
      ("order_id", "{{ order.id }}"),
      ("greeting", "Hello {{ name | title }}!"),
      ("static", "fixed"),
    ]);
    let context = json!({ "order": { "id": "A-17" }, "name": "jane doe" });

    let rendered = render_payload(&templates, &context).unwrap();

    assert_eq!(rendered["order_id"], "A-17");
    assert_eq!(rendered["greeting"], "Hello Jane Doe!");
    assert_eq!(rendered["static"], "fixed");
  }

  #[test]
  fn test_render_scalar_context() {
    let templates = fields(&[("copy", "{{ value }}")]);
    let rendered = render_payload(&templates, &json!(42)).unwrap();
    assert_eq!(rendered["copy"], "42");
  }

  #[test]
  fn test_render_syntax_error() {
    let templates = fields(&[("broken", "{{ unclosed")]);
    let err = render_payload(&templates, &json!({})).unwrap_err();
    assert!(matches!(err, FsmError::TemplateResolution { field, .. } if field == "broken"));
  }

  #[test]
  fn test_coerce_by_schema() {
    let rendered = fields(&[
      ("amount", "12.5"),
      ("count", "3"),
      ("paid", "TRUE"),
      ("tags", "[\"a\"]"),
      ("meta", "{\"k\": 1}"),
      ("none", ""),
      ("label", "plain"),
    ]);
    let schema = BTreeMap::from([
      ("amount".to_string(), SchemaType::Number),
      ("count".to_string(), SchemaType::Integer),
      ("paid".to_string(), SchemaType::Boolean),
      ("tags".to_string(), SchemaType::Array),
      ("meta".to_string(), SchemaType::Object),
      ("none".to_string(), SchemaType::Null),
    ]);

    let value = coerce_payload(&rendered, &schema).unwrap();

    assert_eq!(value["amount"], 12.5);
    assert_eq!(value["count"], 3);
    assert_eq!(value["paid"], true);
    assert_eq!(value["tags"], json!(["a"]));
    assert_eq!(value["meta"], json!({ "k": 1 }));
    assert_eq!(value["none"], serde_json::Value::Null);
    assert_eq!(value["label"], "plain");
  }

  #[test]
  fn test_coerce_rejects_mismatch() {
    let rendered = fields(&[("count", "many")]);
    let schema = BTreeMap::from([("count".to_string(), SchemaType::Integer)]);
    assert!(coerce_payload(&rendered, &schema).is_err());

    let rendered = fields(&[("tags", "{}")]);
    let schema = BTreeMap::from([("tags".to_string(), SchemaType::Array)]);
    assert!(coerce_payload(&rendered, &schema).is_err());
  }
}
