//! Row structs mirroring the SQLite schema, with conversions to model types.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use sqlx::types::Json;
use typeflow_model::{
  AuthConfig, AuthType, Credential, CredentialKind, DebugSession, Execution, ExecutionStatus,
  LogEntry, NodeRunResult, Package, ResponseMode, TriggerType, Webhook, WebhookRequestRecord,
  Workflow,
};

use crate::{Error, StoredCredential};

fn decode<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T, Error> {
  serde_json::from_value(value).map_err(|e| Error::Corrupt(format!("{}: {}", what, e)))
}

fn encode<T: serde::Serialize>(value: &T) -> Json<Value> {
  Json(serde_json::to_value(value).unwrap_or(Value::Null))
}

#[derive(Debug, FromRow)]
pub(crate) struct WorkflowRow {
  pub workflow_id: String,
  pub organization_id: String,
  pub name: String,
  pub description: Option<String>,
  pub version: i64,
  pub active: bool,
  pub metadata: Json<Value>,
  pub nodes: Json<Value>,
  pub connections: Json<Value>,
}

impl WorkflowRow {
  pub fn into_model(self) -> Result<Workflow, Error> {
    Ok(Workflow {
      organization_id: self.organization_id,
      workflow_id: self.workflow_id,
      name: self.name,
      description: self.description,
      version: self.version,
      active: self.active,
      metadata: decode(self.metadata.0, "workflow metadata")?,
      nodes: decode(self.nodes.0, "workflow nodes")?,
      connections: decode(self.connections.0, "workflow connections")?,
    })
  }
}

pub(crate) fn workflow_columns(
  workflow: &Workflow,
) -> (Json<Value>, Json<Value>, Json<Value>) {
  (
    encode(&workflow.metadata),
    encode(&workflow.nodes),
    encode(&workflow.connections),
  )
}

#[derive(Debug, FromRow)]
pub(crate) struct ExecutionRow {
  pub execution_id: String,
  pub workflow_id: String,
  pub organization_id: String,
  pub status: String,
  pub trigger_type: String,
  pub trigger_data: Option<Json<Value>>,
  pub node_results: Json<Value>,
  pub result: Json<Value>,
  pub error: Option<String>,
  pub parent_execution_id: Option<String>,
  pub logs: Json<Value>,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  pub duration_ms: Option<i64>,
}

impl ExecutionRow {
  pub fn into_model(self) -> Result<Execution, Error> {
    let status = ExecutionStatus::parse(&self.status)
      .ok_or_else(|| Error::Corrupt(format!("unknown execution status '{}'", self.status)))?;
    let trigger_type: TriggerType =
      decode(Value::String(self.trigger_type.clone()), "trigger type")?;
    let node_results: Vec<NodeRunResult> = decode(self.node_results.0, "node results")?;
    let logs: Vec<LogEntry> = decode(self.logs.0, "execution logs")?;
    Ok(Execution {
      execution_id: self.execution_id,
      workflow_id: self.workflow_id,
      organization_id: self.organization_id,
      status,
      trigger_type,
      trigger_data: self.trigger_data.map(|j| j.0),
      node_results,
      result: decode(self.result.0, "execution result")?,
      error: self.error,
      parent_execution_id: self.parent_execution_id,
      logs,
      started_at: self.started_at,
      completed_at: self.completed_at,
      duration_ms: self.duration_ms,
    })
  }
}

pub(crate) fn execution_columns(execution: &Execution) -> (Json<Value>, Json<Value>, Json<Value>) {
  (
    encode(&execution.node_results),
    encode(&execution.result),
    encode(&execution.logs),
  )
}

#[derive(Debug, FromRow)]
pub(crate) struct WebhookRow {
  pub webhook_id: String,
  pub organization_id: String,
  pub path: String,
  pub workflow_id: String,
  pub method: Option<String>,
  pub response_mode: String,
  pub is_active: bool,
  pub auth_type: String,
  pub auth_config: Json<Value>,
  pub rate_limit: i64,
}

impl WebhookRow {
  pub fn into_model(self) -> Result<Webhook, Error> {
    let response_mode: ResponseMode =
      decode(Value::String(self.response_mode.clone()), "response mode")?;
    let auth_type: AuthType = decode(Value::String(self.auth_type.clone()), "auth type")?;
    let auth_config: AuthConfig = decode(self.auth_config.0, "auth config")?;
    Ok(Webhook {
      webhook_id: self.webhook_id,
      organization_id: self.organization_id,
      path: self.path,
      workflow_id: self.workflow_id,
      method: self.method,
      response_mode,
      is_active: self.is_active,
      auth_type,
      auth_config,
      rate_limit: self.rate_limit.max(0) as u32,
    })
  }
}

#[derive(Debug, FromRow)]
pub(crate) struct WebhookRequestRow {
  pub request_id: String,
  pub webhook_id: String,
  pub organization_id: String,
  pub path: String,
  pub method: String,
  pub url: String,
  pub headers: Json<Value>,
  pub body: Json<Value>,
  pub query: Json<Value>,
  pub cookies: Json<Value>,
  pub raw_body: String,
  pub received_at: DateTime<Utc>,
}

impl WebhookRequestRow {
  pub fn into_model(self) -> WebhookRequestRecord {
    WebhookRequestRecord {
      request_id: self.request_id,
      webhook_id: self.webhook_id,
      organization_id: self.organization_id,
      path: self.path,
      method: self.method,
      url: self.url,
      headers: self.headers.0,
      body: self.body.0,
      query: self.query.0,
      cookies: self.cookies.0,
      raw_body: self.raw_body,
      received_at: self.received_at,
    }
  }
}

#[derive(Debug, FromRow)]
pub(crate) struct CredentialRow {
  pub credential_id: String,
  pub organization_id: String,
  pub name: String,
  pub kind: String,
  pub config: Vec<u8>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl CredentialRow {
  pub fn into_model(self) -> Result<StoredCredential, Error> {
    let kind = CredentialKind::parse(&self.kind)
      .ok_or_else(|| Error::Corrupt(format!("unknown credential kind '{}'", self.kind)))?;
    Ok(StoredCredential {
      credential: Credential {
        credential_id: self.credential_id,
        organization_id: self.organization_id,
        name: self.name,
        kind,
        created_at: self.created_at,
        updated_at: self.updated_at,
      },
      ciphertext: self.config,
    })
  }
}

#[derive(Debug, FromRow)]
pub(crate) struct DebugSessionRow {
  pub state: Json<Value>,
}

impl DebugSessionRow {
  pub fn into_model(self) -> Result<DebugSession, Error> {
    decode(self.state.0, "debug session state")
  }
}

#[derive(Debug, FromRow)]
pub(crate) struct PackageRow {
  pub organization_id: String,
  pub name: String,
  pub version: String,
  pub types: Option<String>,
  pub installed_at: DateTime<Utc>,
}

impl PackageRow {
  pub fn into_model(self) -> Package {
    Package {
      organization_id: self.organization_id,
      name: self.name,
      version: self.version,
      types: self.types,
      installed_at: self.installed_at,
    }
  }
}
