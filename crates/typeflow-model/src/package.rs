use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A per-organization installed dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
  pub organization_id: String,
  pub name: String,
  pub version: String,
  /// Extracted type declarations, fed to the sandbox's ambient block.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub types: Option<String>,
  pub installed_at: DateTime<Utc>,
}
