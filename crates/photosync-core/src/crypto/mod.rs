//! Protocol codec for server payloads.
//!
//! Short requests (credentials, upload metadata) use plain RSA-OAEP.
//! Everything the server sends back arrives as a [`HybridEnvelope`]: a fresh
//! AES-256-GCM key wrapped with the device public key, with the GCM tag
//! carried in its own field.

mod asymmetric;
mod envelope;

pub use asymmetric::{
    encrypt_for_server, parse_public_key_pem, public_key_fingerprint, public_key_to_pem,
    rsa_decrypt, rsa_encrypt,
};
pub use envelope::{
    decrypt_hybrid_envelope, encrypt_hybrid, HybridEnvelope, AES_KEY_LEN, IV_LEN, TAG_LEN,
};
