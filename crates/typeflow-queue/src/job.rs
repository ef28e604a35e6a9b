use serde::{Deserialize, Serialize};
use serde_json::Value;
use typeflow_model::{ExecutionItem, NodeRunResult, TriggerType};

/// A queued workflow execution request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowJob {
  pub job_id: String,
  pub workflow_id: String,
  pub organization_id: String,
  pub trigger: TriggerType,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub input: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub webhook_path: Option<String>,
}

impl WorkflowJob {
  pub fn new(
    workflow_id: impl Into<String>,
    organization_id: impl Into<String>,
    trigger: TriggerType,
    input: Option<Value>,
  ) -> Self {
    Self {
      job_id: uuid::Uuid::new_v4().to_string(),
      workflow_id: workflow_id.into(),
      organization_id: organization_id.into(),
      trigger,
      input,
      user_id: None,
      webhook_path: None,
    }
  }
}

/// The outcome of one consumed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowJobResult {
  pub job_id: String,
  pub success: bool,
  #[serde(default)]
  pub outputs: Vec<ExecutionItem>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub execution_id: Option<String>,
  pub execution_time_ms: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(default)]
  pub node_results: Vec<NodeRunResult>,
}
