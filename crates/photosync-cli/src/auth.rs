//! Auth token persistence in the system keychain.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;

use photosync_core::session::SessionStore;
use photosync_core::{Error, Result};

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "photosync-cli";

/// One keychain entry per CLI profile.
#[derive(Debug, Clone)]
pub struct KeyringSessionStore {
    username: String,
}

impl KeyringSessionStore {
    pub fn new(profile_name: &str) -> Self {
        Self {
            username: format!("auth_token:{profile_name}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> Result<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| Error::SecureStorage(error.to_string()))
    }
}

impl SessionStore for KeyringSessionStore {
    #[cfg(not(test))]
    fn load_token(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(Error::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn load_token(&self) -> Result<Option<String>> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| Error::SecureStorage(error.to_string()))?;
        Ok(guard.get(&self.username).cloned())
    }

    #[cfg(not(test))]
    fn save_token(&self, token: &str) -> Result<()> {
        self.entry()?
            .set_password(token)
            .map_err(|error| Error::SecureStorage(error.to_string()))
    }

    #[cfg(test)]
    fn save_token(&self, token: &str) -> Result<()> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| Error::SecureStorage(error.to_string()))?;
        guard.insert(self.username.clone(), token.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    fn clear_token(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(Error::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn clear_token(&self) -> Result<()> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| Error::SecureStorage(error.to_string()))?;
        guard.remove(&self.username);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_scoped_per_profile() {
        let work = KeyringSessionStore::new("auth-test-work");
        let home = KeyringSessionStore::new("auth-test-home");

        work.save_token("work-token").unwrap();
        assert_eq!(work.load_token().unwrap().as_deref(), Some("work-token"));
        assert_eq!(home.load_token().unwrap(), None);

        work.clear_token().unwrap();
        assert_eq!(work.load_token().unwrap(), None);
    }

    #[test]
    fn clearing_a_missing_token_is_not_an_error() {
        let store = KeyringSessionStore::new("auth-test-empty");
        store.clear_token().unwrap();
        assert_eq!(store.load_token().unwrap(), None);
    }
}
