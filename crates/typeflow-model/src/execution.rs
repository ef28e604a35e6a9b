use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::item::ExecutionItem;

/// Status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
  Pending,
  Running,
  Completed,
  Failed,
  Cancelled,
}

impl ExecutionStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      ExecutionStatus::Pending => "pending",
      ExecutionStatus::Running => "running",
      ExecutionStatus::Completed => "completed",
      ExecutionStatus::Failed => "failed",
      ExecutionStatus::Cancelled => "cancelled",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "pending" => Some(ExecutionStatus::Pending),
      "running" => Some(ExecutionStatus::Running),
      "completed" => Some(ExecutionStatus::Completed),
      "failed" => Some(ExecutionStatus::Failed),
      "cancelled" => Some(ExecutionStatus::Cancelled),
      _ => None,
    }
  }

  /// Terminal states accept no further transitions.
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
    )
  }
}

/// What started an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
  Manual,
  Webhook,
  Schedule,
  Debug,
  SubWorkflow,
}

impl TriggerType {
  pub fn as_str(&self) -> &'static str {
    match self {
      TriggerType::Manual => "manual",
      TriggerType::Webhook => "webhook",
      TriggerType::Schedule => "schedule",
      TriggerType::Debug => "debug",
      TriggerType::SubWorkflow => "sub_workflow",
    }
  }
}

/// Per-node status within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
  Pending,
  Running,
  Completed,
  Failed,
  /// The node sat on an inactive branch and never ran.
  Skipped,
}

/// The recorded outcome of one node within an execution.
///
/// Results are appended in scheduling order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRunResult {
  pub node_id: String,
  pub status: NodeRunStatus,
  #[serde(default)]
  pub output: Vec<ExecutionItem>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(default)]
  pub duration_ms: i64,
}

impl NodeRunResult {
  pub fn completed(node_id: impl Into<String>, output: Vec<ExecutionItem>, duration_ms: i64) -> Self {
    Self {
      node_id: node_id.into(),
      status: NodeRunStatus::Completed,
      output,
      error: None,
      duration_ms,
    }
  }

  pub fn failed(node_id: impl Into<String>, error: impl Into<String>, duration_ms: i64) -> Self {
    Self {
      node_id: node_id.into(),
      status: NodeRunStatus::Failed,
      output: Vec::new(),
      error: Some(error.into()),
      duration_ms,
    }
  }

  pub fn skipped(node_id: impl Into<String>) -> Self {
    Self {
      node_id: node_id.into(),
      status: NodeRunStatus::Skipped,
      output: Vec::new(),
      error: None,
      duration_ms: 0,
    }
  }
}

/// A log line captured from a code node's `console`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
  pub level: String,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub node_id: Option<String>,
  pub timestamp: DateTime<Utc>,
}

/// One run of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
  pub execution_id: String,
  pub workflow_id: String,
  pub organization_id: String,
  pub status: ExecutionStatus,
  pub trigger_type: TriggerType,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub trigger_data: Option<Value>,
  /// In scheduling order.
  #[serde(default)]
  pub node_results: Vec<NodeRunResult>,
  /// Final output items.
  #[serde(default)]
  pub result: Vec<ExecutionItem>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  /// Execution id of the caller, for sub-workflow runs.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parent_execution_id: Option<String>,
  #[serde(default)]
  pub logs: Vec<LogEntry>,
  pub started_at: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub completed_at: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<i64>,
}

impl Execution {
  /// A fresh `running` execution row.
  pub fn start(
    execution_id: impl Into<String>,
    workflow_id: impl Into<String>,
    organization_id: impl Into<String>,
    trigger_type: TriggerType,
    trigger_data: Option<Value>,
  ) -> Self {
    Self {
      execution_id: execution_id.into(),
      workflow_id: workflow_id.into(),
      organization_id: organization_id.into(),
      status: ExecutionStatus::Running,
      trigger_type,
      trigger_data,
      node_results: Vec::new(),
      result: Vec::new(),
      error: None,
      parent_execution_id: None,
      logs: Vec::new(),
      started_at: Utc::now(),
      completed_at: None,
      duration_ms: None,
    }
  }

  /// Result for one node, if recorded.
  pub fn node_result(&self, node_id: &str) -> Option<&NodeRunResult> {
    self.node_results.iter().find(|r| r.node_id == node_id)
  }
}
