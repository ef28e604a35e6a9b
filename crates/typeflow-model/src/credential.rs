use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported credential backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
  Postgres,
  Mysql,
  Mongodb,
  Redis,
}

impl CredentialKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      CredentialKind::Postgres => "postgres",
      CredentialKind::Mysql => "mysql",
      CredentialKind::Mongodb => "mongodb",
      CredentialKind::Redis => "redis",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "postgres" => Some(CredentialKind::Postgres),
      "mysql" => Some(CredentialKind::Mysql),
      "mongodb" => Some(CredentialKind::Mongodb),
      "redis" => Some(CredentialKind::Redis),
      _ => None,
    }
  }
}

/// A stored credential. The config is encrypted at rest; this struct never
/// carries plaintext config; decryption happens inside the handle pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
  pub credential_id: String,
  pub organization_id: String,
  /// User-chosen name, used for variable injection in code nodes.
  pub name: String,
  pub kind: CredentialKind,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}
