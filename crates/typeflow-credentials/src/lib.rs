//! Typeflow Credentials
//!
//! Encrypted credential storage and typed connection handles.
//!
//! Configs are sealed with AES-256-GCM before they reach the store and are
//! decrypted only when a code node first calls a handle method. Handles are
//! pooled per execution by [`HandlePool`] and closed when the execution
//! ends.

mod config;
mod crypto;
mod error;
mod handle;
mod service;

pub use config::{MongoConfig, RedisConfig, SqlConfig, methods_for_kind};
pub use crypto::CredentialCipher;
pub use error::CredentialError;
pub use handle::{CredentialHandle, HandlePool};
pub use service::CredentialService;
