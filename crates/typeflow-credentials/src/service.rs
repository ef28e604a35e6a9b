use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::info;
use typeflow_model::{Credential, CredentialKind};
use typeflow_store::{Store, StoredCredential};

use crate::config::{MongoConfig, RedisConfig, SqlConfig, parse_config};
use crate::crypto::CredentialCipher;
use crate::error::CredentialError;
use crate::handle::CredentialHandle;

/// Creates, updates, deletes and materializes credentials.
///
/// Configs are encrypted on every write and decrypted only on
/// materialization.
pub struct CredentialService {
  store: Arc<dyn Store>,
  cipher: CredentialCipher,
}

impl CredentialService {
  pub fn new(store: Arc<dyn Store>, cipher: CredentialCipher) -> Self {
    Self { store, cipher }
  }

  /// Create a credential, encrypting its config.
  pub async fn create(
    &self,
    organization_id: &str,
    name: &str,
    kind: CredentialKind,
    config: &Value,
  ) -> Result<Credential, CredentialError> {
    let now = Utc::now();
    let credential = Credential {
      credential_id: uuid::Uuid::new_v4().to_string(),
      organization_id: organization_id.to_string(),
      name: name.to_string(),
      kind,
      created_at: now,
      updated_at: now,
    };
    let ciphertext = self.encrypt_config(config)?;
    self
      .store
      .save_credential(&StoredCredential {
        credential: credential.clone(),
        ciphertext,
      })
      .await?;

    info!(credential = %name, kind = %kind.as_str(), "credential created");
    Ok(credential)
  }

  /// Replace a credential's config, re-encrypting.
  pub async fn update(
    &self,
    organization_id: &str,
    name: &str,
    config: &Value,
  ) -> Result<Credential, CredentialError> {
    let mut stored = self.store.get_credential(organization_id, name).await?;
    stored.ciphertext = self.encrypt_config(config)?;
    stored.credential.updated_at = Utc::now();
    self.store.save_credential(&stored).await?;
    Ok(stored.credential)
  }

  pub async fn delete(&self, credential_id: &str) -> Result<(), CredentialError> {
    self.store.delete_credential(credential_id).await?;
    Ok(())
  }

  pub async fn list(&self, organization_id: &str) -> Result<Vec<Credential>, CredentialError> {
    Ok(self.store.list_credentials(organization_id).await?)
  }

  /// Fetch and decrypt a credential's config.
  pub async fn decrypted_config(
    &self,
    organization_id: &str,
    name: &str,
  ) -> Result<(Credential, Value), CredentialError> {
    let stored = match self.store.get_credential(organization_id, name).await {
      Ok(stored) => stored,
      Err(typeflow_store::Error::NotFound(_)) => {
        return Err(CredentialError::NotFound {
          name: name.to_string(),
        });
      }
      Err(e) => return Err(e.into()),
    };
    let plaintext = self.cipher.decrypt(&stored.ciphertext)?;
    let config: Value = serde_json::from_slice(&plaintext).map_err(|e| {
      CredentialError::InvalidConfig {
        name: name.to_string(),
        message: e.to_string(),
      }
    })?;
    Ok((stored.credential, config))
  }

  /// Validate a config by opening (and immediately closing) a connection.
  ///
  /// Does not persist anything.
  pub async fn test_connection(
    &self,
    kind: CredentialKind,
    config: &Value,
  ) -> Result<(), CredentialError> {
    // Fail early on shape errors so the caller gets a config message rather
    // than a connect timeout.
    match kind {
      CredentialKind::Postgres | CredentialKind::Mysql => {
        parse_config::<SqlConfig>("test", config)?;
      }
      CredentialKind::Mongodb => {
        parse_config::<MongoConfig>("test", config)?;
      }
      CredentialKind::Redis => {
        parse_config::<RedisConfig>("test", config)?;
      }
    }
    let handle = CredentialHandle::connect(kind, "test", config).await?;
    handle.close().await;
    Ok(())
  }

  fn encrypt_config(&self, config: &Value) -> Result<Vec<u8>, CredentialError> {
    let plaintext = serde_json::to_vec(config).map_err(|e| CredentialError::InvalidConfig {
      name: String::new(),
      message: e.to_string(),
    })?;
    self.cipher.encrypt(&plaintext)
  }
}
