use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An opaque binary blob attached to an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryData {
  pub data: Vec<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub mime_type: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub file_name: Option<String>,
}

/// The unit of data flowing between nodes.
///
/// Every edge carries an ordered sequence of items. `paired_item` is a
/// back-reference to the index of the source item this one was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExecutionItem {
  pub json: Map<String, Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub binary: Option<HashMap<String, BinaryData>>,
  #[serde(rename = "pairedItem", skip_serializing_if = "Option::is_none")]
  pub paired_item: Option<usize>,
}

impl ExecutionItem {
  /// Wrap an arbitrary JSON value into an item.
  ///
  /// Objects become the item's `json` directly; anything else is wrapped as
  /// `{"value": <v>}`.
  pub fn from_json(value: Value) -> Self {
    let json = match value {
      Value::Object(map) => map,
      other => {
        let mut map = Map::new();
        map.insert("value".to_string(), other);
        map
      }
    };
    Self {
      json,
      binary: None,
      paired_item: None,
    }
  }

  /// Build an item from a JSON object, or an empty item for `null`.
  pub fn from_trigger_data(data: Option<Value>) -> Self {
    match data {
      Some(value) => Self::from_json(value),
      None => Self::default(),
    }
  }

  /// Read a field by dot-path (`user.address.city`) from the item's json.
  pub fn field(&self, path: &str) -> Option<&Value> {
    let mut current: Option<&Value> = None;
    for (i, segment) in path.split('.').enumerate() {
      current = if i == 0 {
        self.json.get(segment)
      } else {
        current?.as_object()?.get(segment)
      };
      current?;
    }
    current
  }

  /// The item's json as a `Value`.
  pub fn json_value(&self) -> Value {
    Value::Object(self.json.clone())
  }

  pub fn with_paired(mut self, index: usize) -> Self {
    self.paired_item = Some(index);
    self
  }
}
