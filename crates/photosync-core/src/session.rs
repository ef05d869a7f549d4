//! Auth token persistence.

use std::fmt;
use std::sync::Mutex;

use crate::{Error, Result};

/// Where the server-issued auth token lives between runs.
///
/// Hosts back this with a platform keychain; the engine only needs to read
/// it before each upload and replace it on login/logout.
pub trait SessionStore: Send + Sync {
    fn load_token(&self) -> Result<Option<String>>;
    fn save_token(&self, token: &str) -> Result<()>;
    fn clear_token(&self) -> Result<()>;
}

/// Process-local token store.
#[derive(Default)]
pub struct MemorySessionStore {
    token: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl fmt::Debug for MemorySessionStore {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MemorySessionStore")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl SessionStore for MemorySessionStore {
    fn load_token(&self) -> Result<Option<String>> {
        let guard = self
            .token
            .lock()
            .map_err(|error| Error::SecureStorage(error.to_string()))?;
        Ok(guard.clone())
    }

    fn save_token(&self, token: &str) -> Result<()> {
        let mut guard = self
            .token
            .lock()
            .map_err(|error| Error::SecureStorage(error.to_string()))?;
        *guard = Some(token.to_string());
        Ok(())
    }

    fn clear_token(&self) -> Result<()> {
        let mut guard = self
            .token
            .lock()
            .map_err(|error| Error::SecureStorage(error.to_string()))?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_clear() {
        let store = MemorySessionStore::new();
        assert_eq!(store.load_token().unwrap(), None);

        store.save_token("abc").unwrap();
        assert_eq!(store.load_token().unwrap().as_deref(), Some("abc"));

        store.clear_token().unwrap();
        assert_eq!(store.load_token().unwrap(), None);
    }

    #[test]
    fn debug_redacts_token() {
        let store = MemorySessionStore::with_token("very-secret");
        assert!(!format!("{store:?}").contains("very-secret"));
    }
}
