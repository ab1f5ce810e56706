//! Credential store port.
//!
//! Storage and decryption happen elsewhere; the store hands out credentials
//! that are already decrypted and lets the caller drop them after use.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Credential;

/// Errors from the credential store.
#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("Credential store error: {0}")]
    Backend(String),
}

/// Port for fetching a user's decrypted credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// All credentials owned by `owner`.
    async fn list_for_owner(&self, owner: &str) -> Result<Vec<Credential>, CredentialStoreError>;

    /// The owner's credential of `credential_type`, if any.
    async fn get(
        &self,
        owner: &str,
        credential_type: &str,
    ) -> Result<Option<Credential>, CredentialStoreError> {
        Ok(self
            .list_for_owner(owner)
            .await?
            .into_iter()
            .find(|c| c.credential_type == credential_type))
    }
}
