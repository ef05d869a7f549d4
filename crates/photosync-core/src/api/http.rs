//! reqwest-backed server client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::wire::{
    EncryptedRequest, EncryptedResponse, LoginRequest, RegisterClientKeyRequest,
    RegistrationResponse, ServerKeyResponse, StatusResponse, UploadRequest,
};
use super::ServerApi;
use crate::error::{NetworkError, ProtocolError};
use crate::util::{compact_text, is_http_url, normalize_text_option};
use crate::Result;

/// HTTP client for a backup server rooted at `base_url`.
#[derive(Debug, Clone)]
pub struct HttpServerApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpServerApi {
    /// Build a client; endpoints are resolved relative to `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(NetworkError::from)?;
        Ok(Self { base_url, client })
    }

    /// Returns the base URL this client was configured with.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await.map_err(NetworkError::from)?;
        if !status.is_success() {
            return Err(NetworkError::Status {
                status: status.as_u16(),
                message: parse_api_error(status, &body),
            }
            .into());
        }

        serde_json::from_str::<T>(&body).map_err(|error| {
            ProtocolError::MalformedResponse(format!(
                "{endpoint}: {error} in {}",
                compact_text(&body)
            ))
            .into()
        })
    }
}

#[async_trait]
impl ServerApi for HttpServerApi {
    async fn fetch_server_public_key(&self) -> Result<String> {
        let response = self
            .client
            .get(self.url("/server-public-key"))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(NetworkError::from)?;
        let payload: ServerKeyResponse = Self::read_json(response, "server-public-key").await?;

        normalize_text_option(payload.public_key).ok_or_else(|| {
            ProtocolError::MalformedResponse("server-public-key: missing publicKey".to_string())
                .into()
        })
    }

    async fn register_client_key(
        &self,
        username: &str,
        public_key_pem: &str,
    ) -> Result<StatusResponse> {
        let response = self
            .client
            .post(self.url("/register-client-key"))
            .json(&RegisterClientKeyRequest {
                username,
                public_key: public_key_pem,
            })
            .send()
            .await
            .map_err(NetworkError::from)?;
        Self::read_json(response, "register-client-key").await
    }

    async fn register(&self, encrypted_data: String) -> Result<RegistrationResponse> {
        let response = self
            .client
            .post(self.url("/register"))
            .json(&EncryptedRequest { encrypted_data })
            .send()
            .await
            .map_err(NetworkError::from)?;
        Self::read_json(response, "register").await
    }

    async fn verify_registration(&self, encrypted_data: String) -> Result<EncryptedResponse> {
        let response = self
            .client
            .post(self.url("/verify_registration"))
            .json(&EncryptedRequest { encrypted_data })
            .send()
            .await
            .map_err(NetworkError::from)?;
        Self::read_json(response, "verify_registration").await
    }

    async fn login(&self, encrypted_data: String, public_key_pem: &str) -> Result<EncryptedResponse> {
        let response = self
            .client
            .post(self.url("/login"))
            .json(&LoginRequest {
                encrypted_data,
                public_key: public_key_pem,
            })
            .send()
            .await
            .map_err(NetworkError::from)?;
        Self::read_json(response, "login").await
    }

    async fn upload(&self, request: UploadRequest) -> Result<EncryptedResponse> {
        let image = Part::bytes(request.bytes)
            .file_name(request.file_name)
            .mime_str(&request.content_type)
            .map_err(NetworkError::from)?;
        let form = Form::new()
            .text("auth", request.auth)
            .text("metadata", request.metadata)
            .part("image", image);

        let response = self
            .client
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(NetworkError::from)?;
        Self::read_json(response, "upload").await
    }

    async fn list_images(&self, token: &str) -> Result<EncryptedResponse> {
        let response = self
            .client
            .get(self.url("/images"))
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(NetworkError::from)?;
        Self::read_json(response, "images").await
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return compact_text(&message);
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Unknown status")
            .to_string()
    } else {
        trimmed
    }
}

/// Trim, require an http(s) scheme and drop trailing slashes.
pub fn normalize_base_url(raw: String) -> Result<String> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        NetworkError::InvalidConfiguration("server URL must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(NetworkError::InvalidConfiguration(
            "server URL must include http:// or https://".to_string(),
        )
        .into())
    }
}
