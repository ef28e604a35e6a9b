//! Output normalization.
//!
//! Code nodes may return anything; the executor translates the result into
//! an item list. `undefined` (a `None` from the sandbox) passes the inputs
//! through unchanged.

use serde_json::Value;
use typeflow_model::ExecutionItem;

/// Whether a JSON array is already in `{json, ...}` item shape.
fn is_item_array(values: &[Value]) -> bool {
  !values.is_empty()
    && values
      .iter()
      .all(|v| v.as_object().is_some_and(|o| o.contains_key("json")))
}

fn item_from_shaped(value: Value) -> ExecutionItem {
  serde_json::from_value(value.clone()).unwrap_or_else(|_| {
    // Shaped but not decodable (e.g. json is not an object): wrap whatever
    // the json field held.
    let json = value.get("json").cloned().unwrap_or(Value::Null);
    ExecutionItem::from_json(json)
  })
}

/// Normalize a node result into an item list.
///
/// - `None` (undefined) → the inputs, unchanged
/// - an array already in `{json, ...}` shape → used as-is
/// - a plain array → each element wrapped
/// - an object → one item
/// - a primitive → one `{value}` item
pub fn normalize_output(result: Option<Value>, inputs: &[ExecutionItem]) -> Vec<ExecutionItem> {
  let Some(value) = result else {
    return inputs.to_vec();
  };

  match value {
    Value::Array(values) => {
      if is_item_array(&values) {
        values.into_iter().map(item_from_shaped).collect()
      } else {
        values.into_iter().map(ExecutionItem::from_json).collect()
      }
    }
    Value::Null => Vec::new(),
    other => vec![ExecutionItem::from_json(other)],
  }
}
