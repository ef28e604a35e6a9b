//! Model errors.

/// Save-time validation failures. These reject the mutation.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
  /// Two nodes share a label (case-insensitive).
  #[error("duplicate node label '{label}'")]
  DuplicateLabel { label: String },

  /// A connection references a node that does not exist.
  #[error("connection references unknown node '{node_id}'")]
  UnknownNode { node_id: String },

  /// A connection uses a handle the source node does not declare.
  #[error("node '{node_id}' does not declare output handle '{handle}'")]
  UnknownHandle { node_id: String, handle: String },

  /// The item-edge graph contains a cycle.
  #[error("workflow contains a cycle through node '{node_id}'")]
  CycleDetected { node_id: String },

  /// More than one trigger node of the same kind.
  #[error("workflow has more than one '{kind}' trigger node")]
  DuplicateTrigger { kind: String },

  /// A utilities node participates in the item-flow graph.
  #[error("utilities node '{node_id}' may not have item connections")]
  UtilityWithConnections { node_id: String },
}

/// A node's kind-specific config failed to parse.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("invalid config for node '{node_id}': {message}")]
  InvalidConfig { node_id: String, message: String },
}
