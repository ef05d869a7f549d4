//! Device keypair and cached server public key.

mod file;

pub use file::FileKeyStore;

use crate::error::KeyError;

/// RSA modulus size for device keys
pub const DEVICE_KEY_BITS: usize = 2048;

/// Owner of the device keypair and the server public key.
///
/// The private key never leaves the implementation; callers only get the
/// public PEM and a decrypt capability.
pub trait DeviceKeyStore: Send + Sync {
    /// Generate the device keypair if it does not exist yet.
    fn ensure_device_keypair(&self) -> Result<(), KeyError>;

    /// `SubjectPublicKeyInfo` PEM of the device public key.
    fn device_public_key_pem(&self) -> Result<String, KeyError>;

    /// RSA-OAEP(SHA-256) decrypt with the device private key.
    fn decrypt_with_device_key(&self, ciphertext: &[u8]) -> Result<Vec<u8>, KeyError>;

    /// Persist the public key of the currently configured server.
    fn store_server_public_key(&self, pem: &str) -> Result<(), KeyError>;

    /// Public key of the currently configured server, if exchanged.
    fn server_public_key(&self) -> Result<Option<String>, KeyError>;
}
