//! Server API surface.

mod http;
pub mod wire;

pub use http::{normalize_base_url, HttpServerApi};
pub use wire::{
    EncryptedResponse, LoginOutcome, RegistrationResponse, RemoteImage, StatusResponse,
    UploadMetadata, UploadOutcome, UploadRequest,
};

use async_trait::async_trait;

use crate::Result;

/// Transport to the backup server.
///
/// Implementations only move bytes; encryption of requests and decryption of
/// envelopes happen in the engine.
#[async_trait]
pub trait ServerApi: Send + Sync {
    /// `GET /server-public-key`: the server PEM, unauthenticated.
    async fn fetch_server_public_key(&self) -> Result<String>;

    /// `POST /register-client-key`
    async fn register_client_key(&self, username: &str, public_key_pem: &str)
        -> Result<StatusResponse>;

    /// `POST /register` with plain-RSA credentials.
    async fn register(&self, encrypted_data: String) -> Result<RegistrationResponse>;

    /// `POST /verify_registration` with a plain-RSA code confirmation.
    async fn verify_registration(&self, encrypted_data: String) -> Result<EncryptedResponse>;

    /// `POST /login` with plain-RSA credentials and the device public key.
    async fn login(&self, encrypted_data: String, public_key_pem: &str)
        -> Result<EncryptedResponse>;

    /// Multipart `POST /upload`.
    async fn upload(&self, request: UploadRequest) -> Result<EncryptedResponse>;

    /// `GET /images` with a bearer token.
    async fn list_images(&self, token: &str) -> Result<EncryptedResponse>;
}
