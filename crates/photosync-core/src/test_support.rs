//! Fixtures shared by unit tests: fixed RSA keys, image files and an
//! in-memory backup server.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::api::wire::{EncryptedResponse, RegistrationResponse, StatusResponse, UploadRequest};
use crate::api::ServerApi;
use crate::crypto::{encrypt_hybrid, parse_public_key_pem, rsa_decrypt, HybridEnvelope};
use crate::error::{KeyError, NetworkError};
use crate::keystore::DeviceKeyStore;
use crate::Result;

pub const DEVICE_PRIVATE_PEM: &str = include_str!("../testdata/device_private.pem");
pub const DEVICE_PUBLIC_PEM: &str = include_str!("../testdata/device_public.pem");
pub const SERVER_PRIVATE_PEM: &str = include_str!("../testdata/server_private.pem");
pub const SERVER_PUBLIC_PEM: &str = include_str!("../testdata/server_public.pem");

pub const TEST_TOKEN: &str = "test-token";
pub const TEST_PASSWORD: &str = "hunter2";
pub const TEST_VERIFICATION_CODE: &str = "123456";

pub fn device_private_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8_pem(DEVICE_PRIVATE_PEM).unwrap()
}

pub fn server_private_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8_pem(SERVER_PRIVATE_PEM).unwrap()
}

/// Place the device key fixture where `FileKeyStore` expects it.
pub fn install_device_key(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("device_key.pem"), DEVICE_PRIVATE_PEM).unwrap();
}

pub fn write_png(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    image::RgbImage::new(width, height).save(path).unwrap();
}

pub fn set_modified_ms(path: &Path, millis: i64) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    let millis = u64::try_from(millis).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_millis(millis))
        .unwrap();
}

/// A real transport error, without touching the network.
pub fn transport_error() -> NetworkError {
    let error = reqwest::Client::new()
        .get("not a url")
        .build()
        .unwrap_err();
    NetworkError::Http(error)
}

/// Key store holding the device key fixture in memory.
pub struct MemoryKeyStore {
    device_key: RsaPrivateKey,
    server_key: Mutex<Option<String>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self {
            device_key: device_private_key(),
            server_key: Mutex::new(None),
        }
    }

    pub fn with_server_key() -> Self {
        let store = Self::new();
        store.store_server_public_key(SERVER_PUBLIC_PEM).unwrap();
        store
    }
}

impl DeviceKeyStore for MemoryKeyStore {
    fn ensure_device_keypair(&self) -> std::result::Result<(), KeyError> {
        Ok(())
    }

    fn device_public_key_pem(&self) -> std::result::Result<String, KeyError> {
        Ok(DEVICE_PUBLIC_PEM.trim().to_string())
    }

    fn decrypt_with_device_key(&self, ciphertext: &[u8]) -> std::result::Result<Vec<u8>, KeyError> {
        rsa_decrypt(&self.device_key, ciphertext)
    }

    fn store_server_public_key(&self, pem: &str) -> std::result::Result<(), KeyError> {
        *self.server_key.lock().unwrap() = Some(pem.trim().to_string());
        Ok(())
    }

    fn server_public_key(&self) -> std::result::Result<Option<String>, KeyError> {
        Ok(self.server_key.lock().unwrap().clone())
    }
}

/// How the fake server answers the next upload.
#[derive(Debug, Clone)]
pub enum UploadBehaviour {
    /// Store the image under `uploads/<fileName>`.
    Accept,
    /// `success: false` with the given message.
    Reject(Option<String>),
    /// Non-2xx response.
    Status(u16),
    /// Transport failure.
    Offline,
    /// Envelope encrypted for some other device.
    WrongRecipient,
}

/// One upload as the server received it.
#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub auth: String,
    pub metadata: Value,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct FakeState {
    behaviours: VecDeque<UploadBehaviour>,
    uploads: Vec<ReceivedUpload>,
    inventory: Vec<Value>,
    registered_keys: Vec<(String, String)>,
    verified_users: Vec<String>,
}

/// In-memory server speaking the wire protocol with the fixture keys.
#[derive(Default)]
pub struct FakeServer {
    state: Mutex<FakeState>,
    upload_latch: Option<Arc<Semaphore>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each upload waits for one permit on the returned latch.
    pub fn with_upload_latch() -> (Self, Arc<Semaphore>) {
        let latch = Arc::new(Semaphore::new(0));
        let server = Self {
            upload_latch: Some(Arc::clone(&latch)),
            ..Self::default()
        };
        (server, latch)
    }

    pub fn push_upload(&self, behaviour: UploadBehaviour) {
        self.state.lock().unwrap().behaviours.push_back(behaviour);
    }

    pub fn set_inventory(&self, images: Vec<Value>) {
        self.state.lock().unwrap().inventory = images;
    }

    pub fn uploads(&self) -> Vec<ReceivedUpload> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn registered_keys(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().registered_keys.clone()
    }

    pub fn verified_users(&self) -> Vec<String> {
        self.state.lock().unwrap().verified_users.clone()
    }

    fn decrypt_request(encrypted_data: &str) -> Value {
        let ciphertext = base64::engine::general_purpose::STANDARD
            .decode(encrypted_data)
            .unwrap();
        let plaintext = rsa_decrypt(&server_private_key(), &ciphertext).unwrap();
        serde_json::from_slice(&plaintext).unwrap()
    }

    fn seal(payload: &Value) -> HybridEnvelope {
        let device = parse_public_key_pem(DEVICE_PUBLIC_PEM).unwrap();
        encrypt_hybrid(&device, &payload.to_string()).unwrap()
    }

    fn respond(payload: &Value) -> EncryptedResponse {
        EncryptedResponse {
            encrypted_response: Some(Self::seal(payload)),
        }
    }
}

#[async_trait]
impl ServerApi for FakeServer {
    async fn fetch_server_public_key(&self) -> Result<String> {
        Ok(SERVER_PUBLIC_PEM.to_string())
    }

    async fn register_client_key(
        &self,
        username: &str,
        public_key_pem: &str,
    ) -> Result<StatusResponse> {
        self.state
            .lock()
            .unwrap()
            .registered_keys
            .push((username.to_string(), public_key_pem.to_string()));
        Ok(StatusResponse {
            success: true,
            message: Some("Client key registered".to_string()),
        })
    }

    async fn register(&self, encrypted_data: String) -> Result<RegistrationResponse> {
        let credentials = Self::decrypt_request(&encrypted_data);
        if credentials["username"] == "taken" {
            return Ok(RegistrationResponse {
                success: false,
                message: Some("Username already exists".to_string()),
                encrypted_verification_code: None,
            });
        }
        Ok(RegistrationResponse {
            success: true,
            message: Some("Verification code issued".to_string()),
            encrypted_verification_code: Some(Self::seal(
                &json!({ "verificationCode": TEST_VERIFICATION_CODE }),
            )),
        })
    }

    async fn verify_registration(&self, encrypted_data: String) -> Result<EncryptedResponse> {
        let request = Self::decrypt_request(&encrypted_data);
        if request["verificationCode"] == TEST_VERIFICATION_CODE {
            if let Some(username) = request["username"].as_str() {
                self.state
                    .lock()
                    .unwrap()
                    .verified_users
                    .push(username.to_string());
            }
            Ok(Self::respond(&json!({ "success": true, "message": "Verified" })))
        } else {
            Ok(Self::respond(
                &json!({ "success": false, "message": "Invalid verification code" }),
            ))
        }
    }

    async fn login(&self, encrypted_data: String, _public_key_pem: &str) -> Result<EncryptedResponse> {
        let credentials = Self::decrypt_request(&encrypted_data);
        if credentials["password"] == TEST_PASSWORD {
            Ok(Self::respond(&json!({ "success": true, "token": TEST_TOKEN })))
        } else {
            Ok(Self::respond(
                &json!({ "success": false, "message": "Invalid credentials" }),
            ))
        }
    }

    async fn upload(&self, request: UploadRequest) -> Result<EncryptedResponse> {
        if let Some(latch) = &self.upload_latch {
            latch.acquire().await.unwrap().forget();
        }

        let metadata = Self::decrypt_request(&request.metadata);
        let behaviour = {
            let mut state = self.state.lock().unwrap();
            state.uploads.push(ReceivedUpload {
                auth: request.auth,
                metadata: metadata.clone(),
                file_name: request.file_name,
                content_type: request.content_type,
                bytes: request.bytes,
            });
            state
                .behaviours
                .pop_front()
                .unwrap_or(UploadBehaviour::Accept)
        };

        match behaviour {
            UploadBehaviour::Accept => {
                let file_name = metadata["fileName"].as_str().unwrap_or_default();
                Ok(Self::respond(&json!({
                    "success": true,
                    "remoteUrl": format!("uploads/{file_name}"),
                })))
            }
            UploadBehaviour::Reject(message) => {
                let mut payload = json!({ "success": false });
                if let Some(message) = message {
                    payload["message"] = Value::String(message);
                }
                Ok(Self::respond(&payload))
            }
            UploadBehaviour::Status(status) => Err(NetworkError::Status {
                status,
                message: "rejected".to_string(),
            }
            .into()),
            UploadBehaviour::Offline => Err(transport_error().into()),
            UploadBehaviour::WrongRecipient => {
                let other = server_private_key().to_public_key();
                Ok(EncryptedResponse {
                    encrypted_response: Some(
                        encrypt_hybrid(&other, r#"{"success":true,"remoteUrl":"x"}"#).unwrap(),
                    ),
                })
            }
        }
    }

    async fn list_images(&self, token: &str) -> Result<EncryptedResponse> {
        if token != TEST_TOKEN {
            return Err(NetworkError::Status {
                status: 401,
                message: "Invalid token".to_string(),
            }
            .into());
        }
        let images = self.state.lock().unwrap().inventory.clone();
        Ok(Self::respond(&json!({ "success": true, "images": images })))
    }
}
