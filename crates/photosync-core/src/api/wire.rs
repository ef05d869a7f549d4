//! Request and response schemas for the server API.
//!
//! Raw response structs are lenient (every field optional) and are converted
//! into outcome enums with `TryFrom`, so a malformed payload becomes a
//! `ProtocolError` instead of a panic or a silent default.

use serde::{Deserialize, Serialize};

use crate::crypto::HybridEnvelope;
use crate::error::ProtocolError;

/// `GET /server-public-key`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerKeyResponse {
    #[serde(alias = "public_key")]
    pub public_key: Option<String>,
}

/// `POST /register-client-key`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterClientKeyRequest<'a> {
    pub username: &'a str,
    pub public_key: &'a str,
}

/// Plain `{success, message}` acknowledgment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body carrying one plain-RSA encrypted field.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedRequest {
    pub encrypted_data: String,
}

/// `POST /login`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub encrypted_data: String,
    pub public_key: &'a str,
}

/// Any response whose payload is a hybrid envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedResponse {
    pub encrypted_response: Option<HybridEnvelope>,
}

impl EncryptedResponse {
    /// The envelope, or a protocol error naming the endpoint.
    pub fn into_envelope(self, endpoint: &str) -> Result<HybridEnvelope, ProtocolError> {
        self.encrypted_response.ok_or_else(|| {
            ProtocolError::MalformedResponse(format!("{endpoint}: missing encryptedResponse"))
        })
    }
}

/// `POST /register`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub encrypted_verification_code: Option<HybridEnvelope>,
}

/// Multipart `POST /upload` parts.
#[derive(Clone)]
pub struct UploadRequest {
    /// `"Bearer <token>"`
    pub auth: String,
    /// Base64 plain-RSA ciphertext of [`UploadMetadata`]
    pub metadata: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadRequest {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("UploadRequest")
            .field("auth", &"[REDACTED]")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("bytes", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Metadata encrypted into the `metadata` part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub file_name: String,
    pub size: i64,
    pub resolution: String,
    pub source_id: Option<String>,
    pub source_modified_time: i64,
}

/// Credentials encrypted for `/login` and `/register`.
#[derive(Serialize)]
pub struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Code confirmation encrypted for `/verify_registration`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest<'a> {
    pub username: &'a str,
    pub verification_code: &'a str,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn require_success(success: Option<bool>, endpoint: &str) -> Result<bool, ProtocolError> {
    success.ok_or_else(|| {
        ProtocolError::MalformedResponse(format!("{endpoint}: missing boolean success field"))
    })
}

/// Decrypted `/login` payload.
#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    success: Option<bool>,
    token: Option<String>,
    message: Option<String>,
}

/// Result of a login attempt.
#[derive(Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated { token: String },
    Rejected { message: String },
}

impl std::fmt::Debug for LoginOutcome {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authenticated { .. } => formatter
                .debug_struct("Authenticated")
                .field("token", &"[REDACTED]")
                .finish(),
            Self::Rejected { message } => formatter
                .debug_struct("Rejected")
                .field("message", message)
                .finish(),
        }
    }
}

impl TryFrom<LoginPayload> for LoginOutcome {
    type Error = ProtocolError;

    fn try_from(value: LoginPayload) -> Result<Self, Self::Error> {
        if require_success(value.success, "login")? {
            let token = non_empty(value.token).ok_or_else(|| {
                ProtocolError::MalformedResponse("login: success without token".to_string())
            })?;
            Ok(Self::Authenticated { token })
        } else {
            Ok(Self::Rejected {
                message: non_empty(value.message).unwrap_or_else(|| "Login failed".to_string()),
            })
        }
    }
}

/// Decrypted `/upload` acknowledgment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    success: Option<bool>,
    remote_url: Option<String>,
    path: Option<String>,
    message: Option<String>,
}

/// Result of one upload as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Stored { remote_ref: String },
    Rejected { message: String },
}

impl TryFrom<UploadPayload> for UploadOutcome {
    type Error = ProtocolError;

    fn try_from(value: UploadPayload) -> Result<Self, Self::Error> {
        if require_success(value.success, "upload")? {
            let remote_ref = non_empty(value.remote_url)
                .or_else(|| non_empty(value.path))
                .ok_or_else(|| {
                    ProtocolError::MalformedResponse(
                        "upload: success without remoteUrl".to_string(),
                    )
                })?;
            Ok(Self::Stored { remote_ref })
        } else {
            Ok(Self::Rejected {
                message: non_empty(value.message)
                    .unwrap_or_else(|| "Upload failed on server".to_string()),
            })
        }
    }
}

/// Decrypted `{success, message}` payload.
#[derive(Debug, Deserialize)]
pub struct AckPayload {
    success: Option<bool>,
    message: Option<String>,
}

impl AckPayload {
    /// Ok on success, `Rejected` with the server message otherwise.
    pub fn into_result(self, endpoint: &str) -> Result<Option<String>, ProtocolError> {
        if require_success(self.success, endpoint)? {
            Ok(non_empty(self.message))
        } else {
            Err(ProtocolError::Rejected(
                non_empty(self.message).unwrap_or_else(|| format!("{endpoint} failed")),
            ))
        }
    }
}

/// Decrypted `encryptedVerificationCode` payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationCodePayload {
    verification_code: Option<String>,
}

impl TryFrom<VerificationCodePayload> for String {
    type Error = ProtocolError;

    fn try_from(value: VerificationCodePayload) -> Result<Self, Self::Error> {
        non_empty(value.verification_code).ok_or_else(|| {
            ProtocolError::MalformedResponse("register: missing verificationCode".to_string())
        })
    }
}

/// One image of the decrypted `/images` payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteImagePayload {
    id: Option<serde_json::Value>,
    #[serde(alias = "original_filename")]
    original_filename: Option<String>,
    path: Option<String>,
    size: Option<i64>,
    resolution: Option<String>,
    #[serde(alias = "image_id", alias = "imageId")]
    source_id: Option<serde_json::Value>,
    #[serde(alias = "updated_time")]
    updated_time: Option<i64>,
}

/// Decrypted `/images` payload.
#[derive(Debug, Deserialize)]
pub struct InventoryPayload {
    success: Option<bool>,
    images: Option<Vec<RemoteImagePayload>>,
    message: Option<String>,
}

/// One server-side image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteImage {
    pub remote_id: String,
    pub file_name: String,
    pub path: Option<String>,
    pub size: i64,
    pub resolution: String,
    pub source_id: Option<String>,
    pub source_modified_time: i64,
}

impl RemoteImage {
    /// Server path when present, otherwise the server id.
    pub fn remote_ref(&self) -> &str {
        self.path
            .as_deref()
            .filter(|path| !path.is_empty())
            .unwrap_or(&self.remote_id)
    }
}

fn scalar_text(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(text) => non_empty(Some(text)),
        serde_json::Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

impl TryFrom<RemoteImagePayload> for RemoteImage {
    type Error = ProtocolError;

    fn try_from(value: RemoteImagePayload) -> Result<Self, Self::Error> {
        let remote_id = scalar_text(value.id).ok_or_else(|| {
            ProtocolError::MalformedResponse("images: entry without id".to_string())
        })?;
        let file_name = value
            .original_filename
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| {
                ProtocolError::MalformedResponse(format!(
                    "images: entry {remote_id} without originalFilename"
                ))
            })?;

        Ok(Self {
            remote_id,
            file_name,
            path: non_empty(value.path),
            size: value.size.unwrap_or_default(),
            resolution: value.resolution.unwrap_or_default(),
            source_id: scalar_text(value.source_id),
            source_modified_time: value.updated_time.unwrap_or_default(),
        })
    }
}

impl TryFrom<InventoryPayload> for Vec<RemoteImage> {
    type Error = ProtocolError;

    fn try_from(value: InventoryPayload) -> Result<Self, Self::Error> {
        if !require_success(value.success, "images")? {
            return Err(ProtocolError::Rejected(
                non_empty(value.message).unwrap_or_else(|| "Image list request failed".to_string()),
            ));
        }
        value
            .images
            .unwrap_or_default()
            .into_iter()
            .map(RemoteImage::try_from)
            .collect()
    }
}

/// Parse a decrypted JSON payload into `T`.
pub fn parse_payload<P, T>(json: &str, endpoint: &str) -> Result<T, ProtocolError>
where
    P: serde::de::DeserializeOwned,
    T: TryFrom<P, Error = ProtocolError>,
{
    let raw = serde_json::from_str::<P>(json)
        .map_err(|error| ProtocolError::MalformedResponse(format!("{endpoint}: {error}")))?;
    T::try_from(raw)
}
