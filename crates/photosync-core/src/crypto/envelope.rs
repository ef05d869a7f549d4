//! Hybrid RSA + AES-256-GCM envelope.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::asymmetric::rsa_encrypt;
use crate::error::{CryptoError, KeyError};

/// AES-256 key length in bytes
pub const AES_KEY_LEN: usize = 32;
/// GCM IV length in bytes
pub const IV_LEN: usize = 12;
/// GCM tag length in bytes
pub const TAG_LEN: usize = 16;

/// Wire form of a hybrid-encrypted payload. Every field is Base64 without wrapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridEnvelope {
    /// RSA-OAEP wrapped AES key
    pub encrypted_key: String,
    /// 12-byte GCM IV
    pub iv: String,
    /// Ciphertext without the tag
    pub encrypted_data: String,
    /// 16-byte GCM tag
    pub auth_tag: String,
}

/// Encrypt `plaintext` under a fresh AES-256 key wrapped for `recipient`.
pub fn encrypt_hybrid(recipient: &RsaPublicKey, plaintext: &str) -> Result<HybridEnvelope, CryptoError> {
    let mut rng = rand::thread_rng();
    let mut key = Zeroizing::new([0u8; AES_KEY_LEN]);
    rng.fill_bytes(&mut key[..]);
    let mut iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut iv);

    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|error| CryptoError::EncryptionFailed(error.to_string()))?;
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
        .map_err(|error| CryptoError::EncryptionFailed(error.to_string()))?;

    // aes-gcm appends the tag; the wire format carries it separately
    let tag = sealed.split_off(sealed.len() - TAG_LEN);
    let wrapped_key = rsa_encrypt(recipient, &key[..])?;

    Ok(HybridEnvelope {
        encrypted_key: STANDARD.encode(wrapped_key),
        iv: STANDARD.encode(iv),
        encrypted_data: STANDARD.encode(sealed),
        auth_tag: STANDARD.encode(tag),
    })
}

/// Decrypt an envelope, unwrapping the AES key with `device_decrypt`.
pub fn decrypt_hybrid_envelope<F>(
    envelope: &HybridEnvelope,
    device_decrypt: F,
) -> Result<String, CryptoError>
where
    F: FnOnce(&[u8]) -> Result<Vec<u8>, KeyError>,
{
    let wrapped_key = decode_field("encryptedKey", &envelope.encrypted_key)?;
    let iv = decode_field("iv", &envelope.iv)?;
    let ciphertext = decode_field("encryptedData", &envelope.encrypted_data)?;
    let tag = decode_field("authTag", &envelope.auth_tag)?;

    if iv.len() != IV_LEN {
        return Err(CryptoError::MalformedEnvelope(format!(
            "iv must be {IV_LEN} bytes, got {}",
            iv.len()
        )));
    }
    if tag.len() != TAG_LEN {
        return Err(CryptoError::MalformedEnvelope(format!(
            "authTag must be {TAG_LEN} bytes, got {}",
            tag.len()
        )));
    }

    let key = Zeroizing::new(device_decrypt(&wrapped_key).map_err(|error| {
        tracing::debug!("Envelope key unwrap failed: {error}");
        CryptoError::KeyRecoveryFailed
    })?);
    if key.len() != AES_KEY_LEN {
        return Err(CryptoError::KeyRecoveryFailed);
    }

    let cipher =
        Aes256Gcm::new_from_slice(&key[..]).map_err(|_| CryptoError::KeyRecoveryFailed)?;
    let mut sealed = ciphertext;
    sealed.extend_from_slice(&tag);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
        .map_err(|_| CryptoError::TagMismatch)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(value.trim())
        .map_err(|error| CryptoError::MalformedEnvelope(format!("{name}: {error}")))
}
