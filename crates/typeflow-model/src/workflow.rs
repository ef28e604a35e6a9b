use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::graph::Graph;
use crate::node::{Node, NodeKind};

/// Author-provided metadata carried on a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkflowMetadata {
  /// Type declarations prepended to every code node's ambient block.
  #[serde(rename = "typeDeclarations", skip_serializing_if = "Option::is_none")]
  pub type_declarations: Option<String>,
  /// Persisted debug breakpoints.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub breakpoints: Vec<String>,
}

/// A directed graph of nodes plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub organization_id: String,
  pub workflow_id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default = "default_version")]
  pub version: i64,
  #[serde(default = "default_active")]
  pub active: bool,
  #[serde(default)]
  pub metadata: WorkflowMetadata,
  pub nodes: Vec<Node>,
  #[serde(default)]
  pub connections: Vec<Connection>,
}

fn default_version() -> i64 {
  1
}

fn default_active() -> bool {
  true
}

impl Workflow {
  /// Build the graph structure for traversal.
  pub fn graph(&self) -> Graph {
    Graph::new(&self.nodes, &self.connections)
  }

  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&Node> {
    self.nodes.iter().find(|n| n.node_id == node_id)
  }

  /// Get a node by label (case-insensitive).
  pub fn get_node_by_label(&self, label: &str) -> Option<&Node> {
    self
      .nodes
      .iter()
      .find(|n| n.label.eq_ignore_ascii_case(label))
  }

  /// All nodes of a given kind.
  pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
    self.nodes.iter().filter(move |n| n.kind == kind)
  }

  /// The entry node for an invocation of the given trigger kind.
  ///
  /// When several qualify, a node whose `main` handle feeds the graph wins
  /// over one with no outgoing connections.
  pub fn entry_node(&self, kind: NodeKind) -> Option<&Node> {
    let mut candidates = self.nodes_of_kind(kind);
    let first = candidates.next()?;
    let connected = |node: &Node| {
      self
        .connections
        .iter()
        .any(|c| c.source_node_id == node.node_id)
    };
    if connected(first) {
      return Some(first);
    }
    for candidate in candidates {
      if connected(candidate) {
        return Some(candidate);
      }
    }
    Some(first)
  }

  /// Incoming connections of a node, in deterministic source order
  /// (execution_order, then source node id).
  pub fn incoming(&self, node_id: &str) -> Vec<&Connection> {
    let mut incoming: Vec<&Connection> = self
      .connections
      .iter()
      .filter(|c| c.target_node_id == node_id)
      .collect();
    incoming.sort_by(|a, b| {
      let order = |c: &Connection| {
        self
          .get_node(&c.source_node_id)
          .and_then(|n| n.execution_order)
          .unwrap_or(i64::MAX)
      };
      order(a)
        .cmp(&order(b))
        .then_with(|| a.source_node_id.cmp(&b.source_node_id))
    });
    incoming
  }

  /// Outgoing connections of a node.
  pub fn outgoing(&self, node_id: &str) -> Vec<&Connection> {
    self
      .connections
      .iter()
      .filter(|c| c.source_node_id == node_id)
      .collect()
  }
}
