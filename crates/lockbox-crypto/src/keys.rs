use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::error::CryptoError;

pub const KEM_ALGORITHM: &str = "ML-KEM-1024";
pub const SIGNATURE_ALGORITHM: &str = "ML-DSA-87";

pub const KEM_PUBLIC_KEY_SIZE: usize = 1568;
pub const KEM_PRIVATE_KEY_SIZE: usize = 3168;
pub const KEM_CIPHERTEXT_SIZE: usize = 1568;
pub const SHARED_SECRET_SIZE: usize = 32;

pub const SIGNATURE_PUBLIC_KEY_SIZE: usize = 2592;
pub const SIGNATURE_PRIVATE_KEY_SIZE: usize = 4896;
pub const SIGNATURE_SIZE: usize = 4627;

/// A freshly generated keypair. The private half is handed straight back to
/// the caller and never stored.
pub struct KeyPair {
    pub public_key: Vec<u8>,
    pub private_key: Vec<u8>,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key_len", &self.public_key.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

pub struct Encapsulation {
    pub ciphertext: Vec<u8>,
    pub shared_secret: [u8; SHARED_SECRET_SIZE],
}

impl fmt::Debug for Encapsulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encapsulation")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("shared_secret", &"<redacted>")
            .finish()
    }
}

pub fn check_len(what: &'static str, bytes: &[u8], expected: usize) -> Result<(), CryptoError> {
    if bytes.len() != expected {
        return Err(CryptoError::InvalidKeyLength {
            what,
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Encode bytes to base64 for the wire.
pub fn to_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode a base64 wire field. `what` names the field in the error.
pub fn from_base64(what: &'static str, encoded: &str) -> Result<Vec<u8>, CryptoError> {
    BASE64
        .decode(encoded)
        .map_err(|_| CryptoError::InvalidEncoding(what))
}
