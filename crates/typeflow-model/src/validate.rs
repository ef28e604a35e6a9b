use std::collections::{HashMap, HashSet};

use crate::error::ValidationError;
use crate::node::NodeKind;
use crate::workflow::Workflow;

/// Enforce the save-time invariants on a workflow.
///
/// Checks, in order: unique labels (case-insensitive), connection endpoints
/// exist, source handles are declared by their nodes, utilities nodes carry
/// no item edges, at most one trigger node per trigger kind, and no cycles.
pub fn validate_workflow(workflow: &Workflow) -> Result<(), ValidationError> {
  // Sanitized labels drive variable injection, so two labels that sanitize
  // to the same identifier collide even when they differ verbatim.
  let mut labels = HashSet::new();
  for node in &workflow.nodes {
    if !labels.insert(crate::sanitize_label(&node.label).to_ascii_lowercase()) {
      return Err(ValidationError::DuplicateLabel {
        label: node.label.clone(),
      });
    }
  }

  let node_ids: HashSet<&str> = workflow.nodes.iter().map(|n| n.node_id.as_str()).collect();
  for connection in &workflow.connections {
    for endpoint in [&connection.source_node_id, &connection.target_node_id] {
      if !node_ids.contains(endpoint.as_str()) {
        return Err(ValidationError::UnknownNode {
          node_id: endpoint.clone(),
        });
      }
    }
  }

  for node in &workflow.nodes {
    let handles = node.output_handles();
    for connection in workflow.outgoing(&node.node_id) {
      if !handles.contains(&connection.source_handle) {
        return Err(ValidationError::UnknownHandle {
          node_id: node.node_id.clone(),
          handle: connection.source_handle.clone(),
        });
      }
    }
  }

  for node in workflow.nodes_of_kind(NodeKind::Utilities) {
    let has_edges = workflow
      .connections
      .iter()
      .any(|c| c.source_node_id == node.node_id || c.target_node_id == node.node_id);
    if has_edges {
      return Err(ValidationError::UtilityWithConnections {
        node_id: node.node_id.clone(),
      });
    }
  }

  let mut trigger_kinds: HashMap<NodeKind, usize> = HashMap::new();
  for node in &workflow.nodes {
    if node.kind.is_trigger() {
      *trigger_kinds.entry(node.kind).or_default() += 1;
    }
  }
  for (kind, count) in trigger_kinds {
    if count > 1 {
      return Err(ValidationError::DuplicateTrigger {
        kind: format!("{:?}", kind).to_ascii_lowercase(),
      });
    }
  }

  if let Some(node_id) = workflow.graph().find_cycle() {
    return Err(ValidationError::CycleDetected { node_id });
  }

  Ok(())
}
