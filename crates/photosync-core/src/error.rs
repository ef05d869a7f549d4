//! Error types for photosync-core

use thiserror::Error;

/// Result type alias using photosync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in photosync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Device or server key problem
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Envelope or cipher failure
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Transport failure or non-2xx response
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Malformed response or server-reported failure
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Persistence failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No auth token is stored
    #[error("Not logged in")]
    NotAuthenticated,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Auth token could not be read from or written to secure storage
    #[error("Secure storage error: {0}")]
    SecureStorage(String),

    /// A blocking worker panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        Self::Store(StoreError::Sqlite(error))
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Store(StoreError::Io(error))
    }
}

/// Device key store failures.
#[derive(Error, Debug)]
pub enum KeyError {
    /// The device keypair has not been generated yet.
    #[error("Device keypair is not available")]
    KeyUnavailable,

    /// No server public key has been exchanged yet.
    #[error("Server public key has not been exchanged")]
    ServerKeyMissing,

    /// RSA-OAEP decryption with the device key failed.
    #[error("Decryption with device key failed")]
    DecryptionFailed,

    /// Key generation failed.
    #[error("Key generation failed: {0}")]
    Generation(String),

    /// Stored or supplied key material could not be parsed.
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// Key files could not be read or written.
    #[error("Key storage error: {0}")]
    Storage(#[from] std::io::Error),
}

/// Hybrid envelope and RSA codec failures.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// AES-GCM authentication failed.
    #[error("Authentication tag mismatch")]
    TagMismatch,

    /// The wrapped AES key could not be recovered.
    #[error("Failed to recover symmetric key")]
    KeyRecoveryFailed,

    /// Envelope fields are missing, not Base64, or the wrong length.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The peer public key is not a valid RSA SubjectPublicKeyInfo PEM.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Encryption failed (e.g. payload larger than the RSA modulus allows).
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decrypted payload is not UTF-8.
    #[error("Decrypted payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Transport-level failures.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Request could not be built or sent, or the body could not be read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// Numeric status code
        status: u16,
        /// Compacted response body or reason
        message: String,
    },

    /// Server URL or client setup is invalid.
    #[error("Invalid server configuration: {0}")]
    InvalidConfiguration(String),
}

/// Response-shape and server-logic failures.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Response did not match the expected schema.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Server reported `success: false`.
    #[error("Server rejected request: {0}")]
    Rejected(String),
}

/// Persistence failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored row could not be decoded
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}
