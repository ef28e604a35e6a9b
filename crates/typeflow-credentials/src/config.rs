//! Typed connection configs per credential kind.

use serde::{Deserialize, Serialize};
use typeflow_model::CredentialKind;

use crate::error::CredentialError;

/// Connection settings for the SQL backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlConfig {
  pub host: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub port: Option<u16>,
  pub database: String,
  pub user: String,
  #[serde(default)]
  pub password: String,
}

impl SqlConfig {
  pub fn postgres_url(&self) -> String {
    format!(
      "postgres://{}:{}@{}:{}/{}",
      self.user,
      self.password,
      self.host,
      self.port.unwrap_or(5432),
      self.database
    )
  }

  pub fn mysql_url(&self) -> String {
    format!(
      "mysql://{}:{}@{}:{}/{}",
      self.user,
      self.password,
      self.host,
      self.port.unwrap_or(3306),
      self.database
    )
  }
}

/// Connection settings for MongoDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
  /// Full connection string (`mongodb://...`).
  pub uri: String,
  pub database: String,
}

/// Connection settings for Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
  pub host: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub port: Option<u16>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub password: Option<String>,
  #[serde(default)]
  pub db: i64,
}

impl RedisConfig {
  pub fn url(&self) -> String {
    let auth = match &self.password {
      Some(password) => format!(":{}@", password),
      None => String::new(),
    };
    format!(
      "redis://{}{}:{}/{}",
      auth,
      self.host,
      self.port.unwrap_or(6379),
      self.db
    )
  }
}

pub(crate) fn parse_config<T: serde::de::DeserializeOwned>(
  name: &str,
  config: &serde_json::Value,
) -> Result<T, CredentialError> {
  serde_json::from_value(config.clone()).map_err(|e| CredentialError::InvalidConfig {
    name: name.to_string(),
    message: e.to_string(),
  })
}

/// Method names a credential kind exposes to code nodes.
pub fn methods_for_kind(kind: CredentialKind) -> &'static [&'static str] {
  match kind {
    CredentialKind::Postgres | CredentialKind::Mysql => &["query", "connect", "disconnect"],
    CredentialKind::Mongodb => &[
      "find",
      "findOne",
      "insertOne",
      "updateOne",
      "deleteOne",
      "countDocuments",
      "connect",
      "disconnect",
    ],
    CredentialKind::Redis => &["get", "set", "connect", "disconnect"],
  }
}
