//! RSA-OAEP (SHA-256, MGF1-SHA256, no label) helpers and PEM handling.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, KeyError};

fn oaep() -> Oaep {
    Oaep::new::<Sha256>()
}

/// Parse an X.509 `SubjectPublicKeyInfo` PEM.
///
/// Header/footer lines and all whitespace are ignored, so both wrapped and
/// single-line bodies are accepted.
pub fn parse_public_key_pem(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    let body: String = pem
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("-----"))
        .flat_map(|line| line.chars().filter(|c| !c.is_whitespace()))
        .collect();
    if body.is_empty() {
        return Err(CryptoError::InvalidPublicKey("empty PEM body".to_string()));
    }

    let der = STANDARD
        .decode(body.as_bytes())
        .map_err(|error| CryptoError::InvalidPublicKey(error.to_string()))?;
    RsaPublicKey::from_public_key_der(&der)
        .map_err(|error| CryptoError::InvalidPublicKey(error.to_string()))
}

/// Encode a public key as `SubjectPublicKeyInfo` PEM.
pub fn public_key_to_pem(key: &RsaPublicKey) -> Result<String, KeyError> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|error| KeyError::InvalidKey(error.to_string()))
}

/// Hex SHA-256 of the DER encoding, for display.
pub fn public_key_fingerprint(pem: &str) -> Result<String, CryptoError> {
    let key = parse_public_key_pem(pem)?;
    let der = key
        .to_public_key_der()
        .map_err(|error| CryptoError::InvalidPublicKey(error.to_string()))?;
    let digest = Sha256::digest(der.as_bytes());
    Ok(hex::encode(digest))
}

/// RSA-OAEP encrypt raw bytes.
pub fn rsa_encrypt(key: &RsaPublicKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    key.encrypt(&mut rand::thread_rng(), oaep(), data)
        .map_err(|error| CryptoError::EncryptionFailed(error.to_string()))
}

/// RSA-OAEP decrypt with a private key.
pub fn rsa_decrypt(key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, KeyError> {
    key.decrypt(oaep(), ciphertext)
        .map_err(|_| KeyError::DecryptionFailed)
}

/// Plain-RSA request form: Base64 of `RSA_OAEP(serverKey, utf8(plaintext))`.
///
/// Only suitable for payloads that fit in the modulus (190 bytes for 2048-bit keys).
pub fn encrypt_for_server(server_public_key_pem: &str, plaintext: &str) -> Result<String, CryptoError> {
    let key = parse_public_key_pem(server_public_key_pem)?;
    let ciphertext = rsa_encrypt(&key, plaintext.as_bytes())?;
    Ok(STANDARD.encode(ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{server_private_key, SERVER_PUBLIC_PEM};

    #[test]
    fn plain_rsa_request_decrypts_with_matching_key() {
        let encoded = encrypt_for_server(SERVER_PUBLIC_PEM, r#"{"username":"ana"}"#).unwrap();
        assert!(!encoded.contains('\n'));

        let ciphertext = STANDARD.decode(encoded).unwrap();
        assert_eq!(ciphertext.len(), 256);
        let plaintext = rsa_decrypt(&server_private_key(), &ciphertext).unwrap();
        assert_eq!(plaintext, br#"{"username":"ana"}"#);
    }

    #[test]
    fn oversized_plain_rsa_payload_is_rejected() {
        let payload = "x".repeat(300);
        assert!(matches!(
            encrypt_for_server(SERVER_PUBLIC_PEM, &payload),
            Err(CryptoError::EncryptionFailed(_))
        ));
    }

    #[test]
    fn parses_single_line_pem_body() {
        let body: String = SERVER_PUBLIC_PEM
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .collect();
        let pem = format!("-----BEGIN PUBLIC KEY-----\n{body}\n-----END PUBLIC KEY-----");
        assert_eq!(
            parse_public_key_pem(&pem).unwrap(),
            parse_public_key_pem(SERVER_PUBLIC_PEM).unwrap()
        );
    }

    #[test]
    fn rejects_garbage_pem() {
        assert!(parse_public_key_pem("").is_err());
        assert!(parse_public_key_pem("-----BEGIN PUBLIC KEY-----\nnot base64!\n-----END PUBLIC KEY-----").is_err());
        assert!(parse_public_key_pem("-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----").is_err());
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let first = public_key_fingerprint(SERVER_PUBLIC_PEM).unwrap();
        let second = public_key_fingerprint(SERVER_PUBLIC_PEM).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn wrong_private_key_fails_decryption() {
        let ciphertext = rsa_encrypt(&parse_public_key_pem(SERVER_PUBLIC_PEM).unwrap(), b"hi").unwrap();
        let device_key = crate::test_support::device_private_key();
        assert!(matches!(
            rsa_decrypt(&device_key, &ciphertext),
            Err(KeyError::DecryptionFailed)
        ));
    }
}
