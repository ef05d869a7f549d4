//! File-backed key store.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;

use super::{DeviceKeyStore, DEVICE_KEY_BITS};
use crate::crypto::{parse_public_key_pem, public_key_to_pem, rsa_decrypt};
use crate::error::KeyError;

const DEVICE_KEY_FILE: &str = "device_key.pem";
const SERVER_KEY_FILE: &str = "server_public_key.pem";

/// Key store that keeps a PKCS#8 private key (mode 0600 on Unix) and the
/// server public key under one directory.
pub struct FileKeyStore {
    dir: PathBuf,
    device_key: Mutex<Option<Arc<RsaPrivateKey>>>,
}

impl fmt::Debug for FileKeyStore {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("FileKeyStore")
            .field("dir", &self.dir)
            .field("device_key", &"[REDACTED]")
            .finish()
    }
}

impl FileKeyStore {
    /// Create a store rooted at `dir`. Nothing is read or written until used.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            device_key: Mutex::new(None),
        }
    }

    fn device_key_path(&self) -> PathBuf {
        self.dir.join(DEVICE_KEY_FILE)
    }

    fn server_key_path(&self) -> PathBuf {
        self.dir.join(SERVER_KEY_FILE)
    }

    fn cached_key(&self) -> Result<Option<Arc<RsaPrivateKey>>, KeyError> {
        let guard = self
            .device_key
            .lock()
            .map_err(|error| KeyError::InvalidKey(error.to_string()))?;
        Ok(guard.clone())
    }

    fn cache_key(&self, key: RsaPrivateKey) -> Result<Arc<RsaPrivateKey>, KeyError> {
        let key = Arc::new(key);
        let mut guard = self
            .device_key
            .lock()
            .map_err(|error| KeyError::InvalidKey(error.to_string()))?;
        *guard = Some(Arc::clone(&key));
        Ok(key)
    }

    /// Load the private key from memory or disk.
    fn load_device_key(&self) -> Result<Option<Arc<RsaPrivateKey>>, KeyError> {
        if let Some(key) = self.cached_key()? {
            return Ok(Some(key));
        }

        let path = self.device_key_path();
        if !path.exists() {
            return Ok(None);
        }
        let pem = fs::read_to_string(&path)?;
        let key = RsaPrivateKey::from_pkcs8_pem(&pem)
            .map_err(|error| KeyError::InvalidKey(format!("{}: {error}", path.display())))?;
        Ok(Some(self.cache_key(key)?))
    }

    fn device_key(&self) -> Result<Arc<RsaPrivateKey>, KeyError> {
        self.load_device_key()?.ok_or(KeyError::KeyUnavailable)
    }
}

impl DeviceKeyStore for FileKeyStore {
    fn ensure_device_keypair(&self) -> Result<(), KeyError> {
        if self.load_device_key()?.is_some() {
            return Ok(());
        }

        tracing::info!("Generating {DEVICE_KEY_BITS}-bit device keypair");
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), DEVICE_KEY_BITS)
            .map_err(|error| KeyError::Generation(error.to_string()))?;
        let pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|error| KeyError::Generation(error.to_string()))?;

        write_private_file(&self.device_key_path(), pem.as_bytes())?;
        self.cache_key(key)?;
        Ok(())
    }

    fn device_public_key_pem(&self) -> Result<String, KeyError> {
        let key = self.device_key()?;
        public_key_to_pem(&key.to_public_key())
    }

    fn decrypt_with_device_key(&self, ciphertext: &[u8]) -> Result<Vec<u8>, KeyError> {
        let key = self.device_key()?;
        rsa_decrypt(&key, ciphertext)
    }

    fn store_server_public_key(&self, pem: &str) -> Result<(), KeyError> {
        let pem = pem.trim();
        parse_public_key_pem(pem).map_err(|error| KeyError::InvalidKey(error.to_string()))?;

        fs::create_dir_all(&self.dir)?;
        let path = self.server_key_path();
        let tmp = path.with_extension("pem.tmp");
        fs::write(&tmp, format!("{pem}\n"))?;
        fs::rename(&tmp, &path)?;
        tracing::debug!("Stored server public key at {}", path.display());
        Ok(())
    }

    fn server_public_key(&self) -> Result<Option<String>, KeyError> {
        let path = self.server_key_path();
        if !path.exists() {
            return Ok(None);
        }
        let pem = fs::read_to_string(path)?;
        let pem = pem.trim();
        Ok(if pem.is_empty() {
            None
        } else {
            Some(pem.to_string())
        })
    }
}

/// Write `contents` to `path` through a temp file readable only by the owner.
fn write_private_file(path: &Path, contents: &[u8]) -> Result<(), KeyError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("pem.tmp");

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}
