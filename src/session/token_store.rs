//! Typed access to the session tokens and cached user.
//!
//! The store is the only owner of session credentials. Login and refresh
//! replace the pair wholesale; logout and hard auth failures clear every key.

use std::sync::Arc;

use super::{
    KeyValueStorage, SessionCredentials, SessionUser, StorageError, REFRESH_TOKEN_KEY, TOKEN_KEY,
    USER_KEY,
};

#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Store backed by process memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(super::MemoryStorage::new()))
    }

    /// Current access token. Empty strings count as absent.
    pub fn access_token(&self) -> Result<Option<String>, StorageError> {
        self.read_non_empty(TOKEN_KEY)
    }

    /// Current refresh token. Empty strings count as absent.
    pub fn refresh_token(&self) -> Result<Option<String>, StorageError> {
        self.read_non_empty(REFRESH_TOKEN_KEY)
    }

    /// Both tokens, if a complete pair is stored.
    pub fn credentials(&self) -> Result<Option<SessionCredentials>, StorageError> {
        match (self.access_token()?, self.refresh_token()?) {
            (Some(access_token), Some(refresh_token)) => Ok(Some(SessionCredentials {
                access_token,
                refresh_token,
            })),
            _ => Ok(None),
        }
    }

    /// Replace the token pair in a single storage write.
    pub fn save_credentials(&self, credentials: &SessionCredentials) -> Result<(), StorageError> {
        self.storage.set_many(&[
            (TOKEN_KEY, credentials.access_token.as_str()),
            (REFRESH_TOKEN_KEY, credentials.refresh_token.as_str()),
        ])
    }

    /// Cached user profile, if one is stored and still parses.
    pub fn user(&self) -> Result<Option<SessionUser>, StorageError> {
        match self.read_non_empty(USER_KEY)? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(user) => Ok(Some(user)),
                Err(e) => {
                    log::warn!("TokenStore: ignoring unreadable cached user: {}", e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub fn save_user(&self, user: &SessionUser) -> Result<(), StorageError> {
        let raw = serde_json::to_string(user)?;
        self.storage.set(USER_KEY, &raw)
    }

    /// Probe for the signed-in email without propagating errors.
    pub fn peek_user_email(&self) -> Option<String> {
        self.user()
            .ok()
            .flatten()
            .and_then(|user| user.email)
            .filter(|email| !email.trim().is_empty())
    }

    /// Remove tokens and the cached user.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage
            .remove_many(&[TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY])
    }

    fn read_non_empty(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.storage.get(key)?.filter(|value| !value.is_empty()))
    }
}
