use std::fmt;
use std::str::FromStr;

use crate::error::CryptoError;
use crate::keys::{Encapsulation, KeyPair, SHARED_SECRET_SIZE};

/// Operations every key material backend offers. Implementations are
/// stateless, CPU-only and never block on I/O.
pub trait KeyMaterialProvider: Send + Sync {
    fn generate_kem_keypair(&self) -> Result<KeyPair, CryptoError>;

    fn generate_signature_keypair(&self) -> Result<KeyPair, CryptoError>;

    /// Produce a fresh shared secret and the ciphertext that carries it to
    /// the holder of `peer_public`'s private key.
    fn encapsulate(&self, peer_public: &[u8]) -> Result<Encapsulation, CryptoError>;

    fn decapsulate(
        &self,
        ciphertext: &[u8],
        private_key: &[u8],
    ) -> Result<[u8; SHARED_SECRET_SIZE], CryptoError>;

    fn sign(&self, message: &[u8], private_key: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// `Ok(false)` for a signature that does not verify, including malformed
    /// ones. Errors are reserved for an unusable public key.
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8])
        -> Result<bool, CryptoError>;
}

/// Which backend the process runs with. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    /// ML-KEM-1024 and ML-DSA-87.
    PostQuantum,
    /// Shape-compatible stand-in with no security properties.
    Simulated,
}

impl ProviderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PostQuantum => "pq",
            Self::Simulated => "simulated",
        }
    }
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pq" | "post-quantum" => Ok(Self::PostQuantum),
            "simulated" => Ok(Self::Simulated),
            other => Err(format!(
                "unknown crypto provider '{}' (expected 'pq' or 'simulated')",
                other
            )),
        }
    }
}
