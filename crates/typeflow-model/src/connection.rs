use serde::{Deserialize, Serialize};

/// A directed edge between two node handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
  pub source_node_id: String,
  #[serde(default = "default_handle")]
  pub source_handle: String,
  pub target_node_id: String,
  #[serde(default = "default_handle")]
  pub target_handle: String,
}

fn default_handle() -> String {
  "main".to_string()
}

impl Connection {
  pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
    Self {
      source_node_id: source.into(),
      source_handle: default_handle(),
      target_node_id: target.into(),
      target_handle: default_handle(),
    }
  }

  pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
    self.source_handle = handle.into();
    self
  }
}
