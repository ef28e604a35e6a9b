use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How the ingress answers a webhook request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ResponseMode {
  /// Execute inline and answer with the shaped final output.
  #[default]
  WaitForResult,
  /// Enqueue and answer 202 with the job id.
  RespondImmediately,
}

/// Webhook authentication scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
  #[default]
  None,
  ApiKey,
  Bearer,
  Basic,
}

/// Scheme-specific auth settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AuthConfig {
  /// Header holding the api key (default `x-api-key`).
  #[serde(skip_serializing_if = "Option::is_none")]
  pub header_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub api_key: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub token: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub username: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub password: Option<String>,
}

/// A registered webhook endpoint. `(organization_id, path)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
  pub webhook_id: String,
  pub organization_id: String,
  pub path: String,
  pub workflow_id: String,
  /// Restrict to one HTTP method; `None` accepts any.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub method: Option<String>,
  #[serde(default)]
  pub response_mode: ResponseMode,
  #[serde(default = "default_active")]
  pub is_active: bool,
  #[serde(default)]
  pub auth_type: AuthType,
  #[serde(default)]
  pub auth_config: AuthConfig,
  /// Requests per minute; 0 disables the limit.
  #[serde(default)]
  pub rate_limit: u32,
}

fn default_active() -> bool {
  true
}

/// A captured inbound request, persisted before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookRequestRecord {
  pub request_id: String,
  pub webhook_id: String,
  pub organization_id: String,
  pub path: String,
  pub method: String,
  pub url: String,
  pub headers: Value,
  pub body: Value,
  pub query: Value,
  pub cookies: Value,
  pub raw_body: String,
  pub received_at: DateTime<Utc>,
}
