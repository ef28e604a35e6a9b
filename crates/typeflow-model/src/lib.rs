//! Typeflow Model
//!
//! Domain types shared across the Typeflow crates: workflow definitions
//! (nodes, connections, per-kind configs), the item streams that flow along
//! edges, execution and debug-session records, webhooks, credentials, and
//! installed packages.
//!
//! The [`Graph`] type provides traversal over a workflow's connections;
//! [`validate_workflow`] enforces the save-time invariants.

mod connection;
mod credential;
mod debug;
mod error;
mod execution;
mod graph;
mod item;
mod node;
mod package;
mod validate;
mod webhook;
mod workflow;

pub use connection::Connection;
pub use credential::{Credential, CredentialKind};
pub use debug::{CallFrame, DebugSession, DebugStatus};
pub use error::{ConfigError, ValidationError};
pub use execution::{
  Execution, ExecutionStatus, LogEntry, NodeRunResult, NodeRunStatus, TriggerType,
};
pub use graph::Graph;
pub use item::{BinaryData, ExecutionItem};
pub use node::{
  CombineMode, Condition, ConditionOperator, ExecuteWorkflowConfig, IfBranch, IfConfig,
  InvokeMode, MergeConfig, MergeMode, Node, NodeKind, RemoveDuplicatesConfig, ScriptConfig,
};
pub use package::Package;
pub use validate::validate_workflow;
pub use webhook::{AuthConfig, AuthType, ResponseMode, Webhook, WebhookRequestRecord};
pub use workflow::{Workflow, WorkflowMetadata};

/// Sanitize a node label into an identifier usable for variable injection.
///
/// Non-identifier characters become `_`; a leading digit gets a `_` prefix.
pub fn sanitize_label(label: &str) -> String {
  let mut out = String::with_capacity(label.len() + 1);
  for (i, c) in label.chars().enumerate() {
    if c.is_ascii_alphanumeric() || c == '_' {
      if i == 0 && c.is_ascii_digit() {
        out.push('_');
      }
      out.push(c);
    } else {
      out.push('_');
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::sanitize_label;

  #[test]
  fn sanitize_replaces_non_identifier_chars() {
    assert_eq!(sanitize_label("My Node"), "My_Node");
    assert_eq!(sanitize_label("fetch-users"), "fetch_users");
    assert_eq!(sanitize_label("a.b.c"), "a_b_c");
  }

  #[test]
  fn sanitize_prefixes_leading_digit() {
    assert_eq!(sanitize_label("2nd step"), "_2nd_step");
  }

  #[test]
  fn sanitize_keeps_valid_identifiers() {
    assert_eq!(sanitize_label("already_valid"), "already_valid");
  }
}
