use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// The kind of a node. It determines the node's behavior and config shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
  Trigger,
  Webhook,
  Code,
  Utilities,
  If,
  Merge,
  ExecuteWorkflow,
  WorkflowInput,
  WorkflowOutput,
  WebhookResponse,
  RemoveDuplicates,
  Generic,
}

impl NodeKind {
  /// Whether this kind can start an execution.
  pub fn is_trigger(&self) -> bool {
    matches!(
      self,
      NodeKind::Trigger | NodeKind::Webhook | NodeKind::WorkflowInput
    )
  }
}

/// A typed processing step in a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub node_id: String,
  pub kind: NodeKind,
  /// Unique per workflow (case-insensitive); used for variable injection.
  pub label: String,
  /// Opaque layout data for the editor.
  #[serde(default)]
  pub position: Value,
  /// Kind-specific configuration.
  #[serde(default)]
  pub config: Value,
  /// Advisory ordering used to make fan-in concatenation deterministic.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub execution_order: Option<i64>,
}

impl Node {
  /// Parse the kind-specific config, defaulting missing fields.
  fn parse_config<T: serde::de::DeserializeOwned>(&self) -> Result<T, ConfigError> {
    let config = match &self.config {
      Value::Null => Value::Object(serde_json::Map::new()),
      other => other.clone(),
    };
    serde_json::from_value(config).map_err(|e| ConfigError::InvalidConfig {
      node_id: self.node_id.clone(),
      message: e.to_string(),
    })
  }

  pub fn script_config(&self) -> Result<ScriptConfig, ConfigError> {
    self.parse_config()
  }

  pub fn if_config(&self) -> Result<IfConfig, ConfigError> {
    self.parse_config()
  }

  pub fn merge_config(&self) -> Result<MergeConfig, ConfigError> {
    self.parse_config()
  }

  pub fn execute_workflow_config(&self) -> Result<ExecuteWorkflowConfig, ConfigError> {
    self.parse_config()
  }

  pub fn remove_duplicates_config(&self) -> Result<RemoveDuplicatesConfig, ConfigError> {
    self.parse_config()
  }

  /// The output handles this node declares.
  ///
  /// If-nodes declare one handle per branch plus `else` (or `true`/`false`
  /// in the legacy binary form); everything else has a single `main` handle.
  pub fn output_handles(&self) -> Vec<String> {
    match self.kind {
      NodeKind::If => match self.if_config() {
        Ok(config) => {
          if config.branches.is_empty() {
            vec!["true".to_string(), "false".to_string()]
          } else {
            let mut handles: Vec<String> =
              config.branches.iter().map(|b| b.handle.clone()).collect();
            handles.push(config.else_handle.unwrap_or_else(|| "else".to_string()));
            handles
          }
        }
        Err(_) => vec!["true".to_string(), "false".to_string()],
      },
      _ => vec!["main".to_string()],
    }
  }
}

/// Config for `code` and `utilities` nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScriptConfig {
  #[serde(default)]
  pub code: String,
}

/// How multiple conditions within a branch combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
  #[default]
  And,
  Or,
}

/// Comparison operators for if-node conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
  Equals,
  NotEquals,
  GreaterThan,
  GreaterThanOrEqual,
  LessThan,
  LessThanOrEqual,
  Contains,
  NotContains,
  StartsWith,
  EndsWith,
  IsEmpty,
  IsNotEmpty,
  Exists,
}

/// A single condition: a dot-path into the item json, an operator, and a
/// literal operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
  pub field: String,
  pub operator: ConditionOperator,
  #[serde(default)]
  pub value: Value,
}

/// One branch of an if-node: the handle that activates when it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfBranch {
  pub handle: String,
  #[serde(default)]
  pub combine: CombineMode,
  #[serde(default)]
  pub conditions: Vec<Condition>,
}

/// Config for if-nodes.
///
/// The ordered `branches` form activates the first matching branch's handle
/// (or `else_handle`). The legacy binary form sets `condition` alone and
/// emits on `true`/`false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IfConfig {
  #[serde(default)]
  pub branches: Vec<IfBranch>,
  #[serde(rename = "elseHandle", skip_serializing_if = "Option::is_none")]
  pub else_handle: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub condition: Option<Condition>,
}

/// Merge strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum MergeMode {
  #[default]
  Append,
  MergeByPosition,
  MergeByKey,
  Multiplex,
  ChooseBranch,
}

/// Config for merge-nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MergeConfig {
  #[serde(default)]
  pub mode: MergeMode,
  /// Join field for `mergeByKey`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub key: Option<String>,
}

/// Whether a sub-workflow runs once with the full batch or once per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InvokeMode {
  #[default]
  Once,
  Foreach,
}

/// Config for `executeWorkflow` nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteWorkflowConfig {
  pub workflow_id: String,
  #[serde(default)]
  pub mode: InvokeMode,
}

/// Config for `removeDuplicates` nodes.
///
/// With `field` set, items deduplicate on that dot-path; otherwise on the
/// whole json object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RemoveDuplicatesConfig {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
}
