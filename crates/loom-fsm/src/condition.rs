//! Transition guard conditions.
//!
//! A condition is either a structured predicate over a dotted field path of the
//! event payload, or a free-form minijinja boolean expression:
//!
//! ```json
//! [
//!   { "field": "order.amount", "operator": "greater_than", "operand": 100 },
//!   { "expression": "status in ['paid', 'settled'] and not refunded" }
//! ]
//! ```
//!
//! Missing fields and incomparable types make a predicate false. Only expression
//! evaluation errors are reported as errors.

use std::cmp::Ordering;

use minijinja::Environment;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
  Equals,
  NotEquals,
  GreaterThan,
  GreaterOrEqual,
  LessThan,
  LessOrEqual,
  Exists,
  NotExists,
  In,
  Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
  Expression {
    expression: String,
  },
  Predicate {
    field: String,
    operator: Operator,
    #[serde(default)]
    operand: Value,
  },
}

impl Condition {
  pub fn predicate(field: impl Into<String>, operator: Operator, operand: Value) -> Self {
    Self::Predicate {
      field: field.into(),
      operator,
      operand,
    }
  }

  pub fn expression(expression: impl Into<String>) -> Self {
    Self::Expression {
      expression: expression.into(),
    }
  }
}

/// Evaluate `condition` against an event payload.
pub fn evaluate_condition(condition: &Condition, payload: &Value) -> Result<bool, String> {
  match condition {
    Condition::Predicate {
      field,
      operator,
      operand,
    } => Ok(evaluate_predicate(lookup(payload, field), *operator, operand)),
    Condition::Expression { expression } => evaluate_expression(expression, payload),
  }
}

/// Check that an expression compiles. Used when a machine is loaded.
pub(crate) fn check_expression(expression: &str) -> Result<(), String> {
  let env = Environment::new();
  env
    .compile_expression(expression)
    .map(|_| ())
    .map_err(|e| e.to_string())
}

fn evaluate_expression(expression: &str, payload: &Value) -> Result<bool, String> {
  let env = Environment::new();
  let compiled = env
    .compile_expression(expression)
    .map_err(|e| e.to_string())?;

  let context = match payload {
    Value::Object(_) => payload.clone(),
    _ => serde_json::json!({ "value": payload }),
  };

  compiled
    .eval(&context)
    .map(|result| result.is_true())
    .map_err(|e| e.to_string())
}

fn evaluate_predicate(value: Option<&Value>, operator: Operator, operand: &Value) -> bool {
  match operator {
    Operator::Exists => value.is_some_and(|v| !v.is_null()),
    Operator::NotExists => value.is_none_or(|v| v.is_null()),
    Operator::Equals => value.is_some_and(|v| values_equal(v, operand)),
    Operator::NotEquals => value.is_none_or(|v| !values_equal(v, operand)),
    Operator::GreaterThan => compare(value, operand) == Some(Ordering::Greater),
    Operator::GreaterOrEqual => matches!(
      compare(value, operand),
      Some(Ordering::Greater | Ordering::Equal)
    ),
    Operator::LessThan => compare(value, operand) == Some(Ordering::Less),
    Operator::LessOrEqual => matches!(
      compare(value, operand),
      Some(Ordering::Less | Ordering::Equal)
    ),
    Operator::In => match (value, operand) {
      (Some(v), Value::Array(items)) => items.iter().any(|item| values_equal(v, item)),
      _ => false,
    },
    Operator::Contains => match value {
      Some(Value::String(s)) => operand.as_str().is_some_and(|needle| s.contains(needle)),
      Some(Value::Array(items)) => items.iter().any(|item| values_equal(item, operand)),
      Some(Value::Object(map)) => operand.as_str().is_some_and(|key| map.contains_key(key)),
      _ => false,
    },
  }
}

/// Resolve a dotted path such as `order.items.0.sku`.
fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
  path.split('.').try_fold(payload, |current, segment| match current {
    Value::Object(map) => map.get(segment),
    Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
    _ => None,
  })
}

// Numbers compare by value so that `1` equals `1.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
    _ => a == b,
  }
}

fn compare(value: Option<&Value>, operand: &Value) -> Option<Ordering> {
  match (value?, operand) {
    (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
    (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
    _ => None,
  }
}
