//! Credential errors.

/// Errors from the credential service and connection handles.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
  /// Credential not found for this organization.
  #[error("credential '{name}' not found")]
  NotFound { name: String },

  /// Key material is missing or malformed.
  #[error("invalid encryption key: {0}")]
  InvalidKey(String),

  /// Encryption or decryption failed (wrong key or tampered ciphertext).
  #[error("credential crypto failure: {0}")]
  Crypto(String),

  /// The decrypted config does not match the credential kind's shape.
  #[error("invalid config for credential '{name}': {message}")]
  InvalidConfig { name: String, message: String },

  /// Connecting to or querying the backing service failed.
  #[error("{kind} connection error: {message}")]
  Connection { kind: String, message: String },

  /// The handle does not expose the requested method.
  #[error("credential type '{kind}' has no method '{method}'")]
  UnsupportedMethod { kind: String, method: String },

  #[error(transparent)]
  Store(#[from] typeflow_store::Error),
}
