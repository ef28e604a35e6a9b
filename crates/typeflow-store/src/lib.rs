//! Typeflow Store
//!
//! Storage trait and SQLite implementation for workflows, executions,
//! webhooks, credentials, debug sessions and packages.
//!
//! The [`Store`] trait is the persistence seam the executor, debug
//! controller and webhook ingress write through. Each logical transaction is
//! a single write; executions update their row once at completion.

mod rows;
mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use typeflow_model::{
  Credential, DebugSession, Execution, ExecutionStatus, LogEntry, Package, Webhook,
  WebhookRequestRecord, Workflow,
};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// A stored JSON payload failed to decode.
  #[error("corrupt stored record: {0}")]
  Corrupt(String),
}

/// A credential row paired with its encrypted config.
#[derive(Debug, Clone)]
pub struct StoredCredential {
  pub credential: Credential,
  pub ciphertext: Vec<u8>,
}

/// Storage operations the core components depend on.
#[async_trait]
pub trait Store: Send + Sync {
  // Workflows

  /// Insert or replace a workflow definition.
  async fn save_workflow(&self, workflow: &Workflow) -> Result<(), Error>;

  async fn get_workflow(&self, organization_id: &str, workflow_id: &str)
    -> Result<Workflow, Error>;

  async fn list_workflows(&self, organization_id: &str) -> Result<Vec<Workflow>, Error>;

  /// Delete a workflow and, by ownership, its embedded nodes/connections.
  async fn delete_workflow(&self, organization_id: &str, workflow_id: &str) -> Result<(), Error>;

  // Executions

  async fn create_execution(&self, execution: &Execution) -> Result<(), Error>;

  /// Write the final state of an execution in one pass.
  async fn update_execution(&self, execution: &Execution) -> Result<(), Error>;

  async fn update_execution_status(
    &self,
    execution_id: &str,
    status: ExecutionStatus,
    completed_at: Option<DateTime<Utc>>,
  ) -> Result<(), Error>;

  async fn get_execution(&self, execution_id: &str) -> Result<Execution, Error>;

  async fn list_executions(&self, workflow_id: &str) -> Result<Vec<Execution>, Error>;

  async fn append_execution_log(&self, execution_id: &str, entry: &LogEntry) -> Result<(), Error>;

  // Webhooks

  async fn save_webhook(&self, webhook: &Webhook) -> Result<(), Error>;

  async fn get_webhook(&self, organization_id: &str, path: &str) -> Result<Webhook, Error>;

  async fn list_webhooks(&self, organization_id: &str) -> Result<Vec<Webhook>, Error>;

  async fn delete_webhook(&self, webhook_id: &str) -> Result<(), Error>;

  async fn record_webhook_request(&self, request: &WebhookRequestRecord) -> Result<(), Error>;

  async fn latest_webhook_request(&self, webhook_id: &str)
    -> Result<WebhookRequestRecord, Error>;

  // Credentials

  async fn save_credential(&self, credential: &StoredCredential) -> Result<(), Error>;

  async fn get_credential(
    &self,
    organization_id: &str,
    name: &str,
  ) -> Result<StoredCredential, Error>;

  async fn list_credentials(&self, organization_id: &str) -> Result<Vec<Credential>, Error>;

  async fn delete_credential(&self, credential_id: &str) -> Result<(), Error>;

  // Debug sessions

  /// Insert or replace the session snapshot.
  async fn save_debug_session(&self, session: &DebugSession) -> Result<(), Error>;

  async fn get_debug_session(&self, session_id: &str) -> Result<DebugSession, Error>;

  async fn list_debug_sessions(&self, workflow_id: &str) -> Result<Vec<DebugSession>, Error>;

  // Packages

  async fn save_package(&self, package: &Package) -> Result<(), Error>;

  async fn list_packages(&self, organization_id: &str) -> Result<Vec<Package>, Error>;

  async fn delete_package(&self, organization_id: &str, name: &str) -> Result<(), Error>;
}
