//! Credential Store Adapters
//!
//! The gateway validates logons through the [`CredentialStore`] port. The
//! static adapter here is backed by configuration; production deployments
//! swap in a real backend behind the same port.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::application::ports::{AuthError, CredentialStore};

/// Config-backed credential store.
pub struct StaticCredentialStore {
    credentials: HashMap<String, String>,
}

impl StaticCredentialStore {
    /// Build from username/password pairs.
    #[must_use]
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            credentials: pairs.into_iter().collect(),
        }
    }

    /// Number of configured users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Whether no users are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

impl std::fmt::Debug for StaticCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentialStore")
            .field("users", &self.credentials.len())
            .finish()
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn authenticate(&self, username: &str, password: &str) -> Result<(), AuthError> {
        match self.credentials.get(username) {
            Some(expected) if expected == password => Ok(()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> StaticCredentialStore {
        StaticCredentialStore::new([("trader".to_string(), "secret".to_string())])
    }

    #[tokio::test]
    async fn valid_credentials_accepted() {
        assert!(make_store().authenticate("trader", "secret").await.is_ok());
    }

    #[tokio::test]
    async fn wrong_password_refused() {
        let err = make_store()
            .authenticate("trader", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unknown_user_refused() {
        let err = make_store()
            .authenticate("nobody", "secret")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[test]
    fn debug_does_not_leak_passwords() {
        let debug = format!("{:?}", make_store());
        assert!(!debug.contains("secret"));
    }
}
