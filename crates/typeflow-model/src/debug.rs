use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::execution::NodeRunResult;
use crate::item::ExecutionItem;

/// Status of a debug session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugStatus {
  Active,
  Paused,
  Completed,
  Terminated,
}

impl DebugStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      DebugStatus::Active => "active",
      DebugStatus::Paused => "paused",
      DebugStatus::Completed => "completed",
      DebugStatus::Terminated => "terminated",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "active" => Some(DebugStatus::Active),
      "paused" => Some(DebugStatus::Paused),
      "completed" => Some(DebugStatus::Completed),
      "terminated" => Some(DebugStatus::Terminated),
      _ => None,
    }
  }

  /// Completed and terminated sessions accept no further operations.
  pub fn is_ended(&self) -> bool {
    matches!(self, DebugStatus::Completed | DebugStatus::Terminated)
  }
}

/// One frame of sub-workflow nesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFrame {
  pub caller_execution_id: String,
  pub caller_node_id: String,
  pub workflow_id: String,
}

/// Durable state of one step-wise execution.
///
/// When `status` is `paused`, `current_node_id` names the node the session
/// stopped in front of and `next_node_ids` is the exact frontier that
/// `continue` will schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugSession {
  pub session_id: String,
  pub workflow_id: String,
  pub organization_id: String,
  pub status: DebugStatus,
  #[serde(default)]
  pub breakpoints: BTreeSet<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub current_node_id: Option<String>,
  #[serde(default)]
  pub next_node_ids: Vec<String>,
  #[serde(default)]
  pub node_results: Vec<NodeRunResult>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub trigger_data: Option<Value>,
  #[serde(default)]
  pub call_stack: Vec<CallFrame>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl DebugSession {
  pub fn new(
    session_id: impl Into<String>,
    workflow_id: impl Into<String>,
    organization_id: impl Into<String>,
    breakpoints: BTreeSet<String>,
    trigger_data: Option<Value>,
  ) -> Self {
    let now = Utc::now();
    Self {
      session_id: session_id.into(),
      workflow_id: workflow_id.into(),
      organization_id: organization_id.into(),
      status: DebugStatus::Active,
      breakpoints,
      current_node_id: None,
      next_node_ids: Vec::new(),
      node_results: Vec::new(),
      trigger_data,
      call_stack: Vec::new(),
      created_at: now,
      updated_at: now,
    }
  }

  /// Output items of all completed nodes, keyed by node id.
  pub fn node_outputs(&self) -> impl Iterator<Item = (&str, &[ExecutionItem])> {
    self
      .node_results
      .iter()
      .map(|r| (r.node_id.as_str(), r.output.as_slice()))
  }
}
