//! If-node evaluation.
//!
//! Branches are evaluated in order against the first input item; exactly one
//! outgoing handle becomes active: the first matching branch, or the else
//! handle. The legacy binary form carries a single condition and emits on
//! `true`/`false`.

use serde_json::Value;
use typeflow_model::{
  CombineMode, Condition, ConditionOperator, ExecutionItem, IfConfig,
};

/// The handle an if-node activates for the given input.
pub fn evaluate_if(config: &IfConfig, items: &[ExecutionItem]) -> String {
  let first = items.first().cloned().unwrap_or_default();

  if config.branches.is_empty() {
    let matched = config
      .condition
      .as_ref()
      .map(|c| evaluate_condition(c, &first))
      .unwrap_or(false);
    return if matched { "true" } else { "false" }.to_string();
  }

  for branch in &config.branches {
    let matched = match branch.combine {
      CombineMode::And => branch.conditions.iter().all(|c| evaluate_condition(c, &first)),
      CombineMode::Or => branch.conditions.iter().any(|c| evaluate_condition(c, &first)),
    };
    if matched {
      return branch.handle.clone();
    }
  }

  config
    .else_handle
    .clone()
    .unwrap_or_else(|| "else".to_string())
}

fn evaluate_condition(condition: &Condition, item: &ExecutionItem) -> bool {
  let left = item.field(&condition.field);
  let right = &condition.value;

  match condition.operator {
    ConditionOperator::Exists => left.is_some(),
    ConditionOperator::IsEmpty => is_empty(left),
    ConditionOperator::IsNotEmpty => !is_empty(left),
    ConditionOperator::Equals => left.is_some_and(|l| json_eq(l, right)),
    ConditionOperator::NotEquals => !left.is_some_and(|l| json_eq(l, right)),
    ConditionOperator::GreaterThan => compare(left, right).is_some_and(|o| o.is_gt()),
    ConditionOperator::GreaterThanOrEqual => compare(left, right).is_some_and(|o| o.is_ge()),
    ConditionOperator::LessThan => compare(left, right).is_some_and(|o| o.is_lt()),
    ConditionOperator::LessThanOrEqual => compare(left, right).is_some_and(|o| o.is_le()),
    ConditionOperator::Contains => contains(left, right),
    ConditionOperator::NotContains => !contains(left, right),
    ConditionOperator::StartsWith => str_pair(left, right).is_some_and(|(l, r)| l.starts_with(r)),
    ConditionOperator::EndsWith => str_pair(left, right).is_some_and(|(l, r)| l.ends_with(r)),
  }
}

fn is_empty(value: Option<&Value>) -> bool {
  match value {
    None | Some(Value::Null) => true,
    Some(Value::String(s)) => s.is_empty(),
    Some(Value::Array(a)) => a.is_empty(),
    Some(Value::Object(o)) => o.is_empty(),
    Some(_) => false,
  }
}

fn json_eq(left: &Value, right: &Value) -> bool {
  // Numbers compare by value so 1 == 1.0.
  match (left.as_f64(), right.as_f64()) {
    (Some(l), Some(r)) => l == r,
    _ => left == right,
  }
}

fn compare(left: Option<&Value>, right: &Value) -> Option<std::cmp::Ordering> {
  let left = left?;
  if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
    return l.partial_cmp(&r);
  }
  if let (Some(l), Some(r)) = (left.as_str(), right.as_str()) {
    return Some(l.cmp(r));
  }
  None
}

fn contains(left: Option<&Value>, right: &Value) -> bool {
  match left {
    Some(Value::String(haystack)) => right
      .as_str()
      .is_some_and(|needle| haystack.contains(needle)),
    Some(Value::Array(values)) => values.iter().any(|v| json_eq(v, right)),
    _ => false,
  }
}

fn str_pair<'a>(left: Option<&'a Value>, right: &'a Value) -> Option<(&'a str, &'a str)> {
  Some((left?.as_str()?, right.as_str()?))
}
