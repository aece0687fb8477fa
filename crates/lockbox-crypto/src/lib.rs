//! LockBox key material service.
//!
//! Generates and operates post-quantum key material: ML-KEM-1024 for key
//! encapsulation and ML-DSA-87 for signatures. The server never keeps private
//! keys; everything here is a pure function of its inputs plus fresh
//! randomness.
//!
//! A simulated provider exists for environments without the certified
//! backend. It can only be selected explicitly at startup, and the active
//! mode is reported by [`KeyMaterialService::is_degraded`] so the HTTP layer
//! can surface it on every response.

pub mod error;
pub mod keys;
#[cfg(feature = "pq")]
pub mod pq;
pub mod provider;
pub mod simulated;

use std::sync::Arc;

use tracing::{debug, warn};

pub use error::CryptoError;
pub use keys::{Encapsulation, KeyPair};
pub use provider::{KeyMaterialProvider, ProviderMode};

use keys::{KEM_ALGORITHM, SHARED_SECRET_SIZE, SIGNATURE_ALGORITHM};
use simulated::SimulatedProvider;

#[derive(Clone)]
pub struct KeyMaterialService {
    provider: Arc<dyn KeyMaterialProvider>,
    mode: ProviderMode,
}

impl KeyMaterialService {
    /// Build the service for the configured mode. `Simulated` is refused unless
    /// `allow_insecure` is set.
    pub fn select(mode: ProviderMode, allow_insecure: bool) -> Result<Self, CryptoError> {
        match mode {
            ProviderMode::PostQuantum => Self::post_quantum(),
            ProviderMode::Simulated if allow_insecure => Ok(Self::simulated()),
            ProviderMode::Simulated => Err(CryptoError::InsecureModeRefused),
        }
    }

    #[cfg(feature = "pq")]
    pub fn post_quantum() -> Result<Self, CryptoError> {
        Ok(Self {
            provider: Arc::new(pq::PostQuantumProvider),
            mode: ProviderMode::PostQuantum,
        })
    }

    #[cfg(not(feature = "pq"))]
    pub fn post_quantum() -> Result<Self, CryptoError> {
        Err(CryptoError::ProviderUnavailable)
    }

    /// Shape-only key material. Logs loudly; callers must expose
    /// [`Self::is_degraded`] at their boundary.
    pub fn simulated() -> Self {
        warn!(
            "SIMULATED key material provider enabled: outputs have the {}/{} shapes but NO security",
            KEM_ALGORITHM, SIGNATURE_ALGORITHM
        );
        Self {
            provider: Arc::new(SimulatedProvider),
            mode: ProviderMode::Simulated,
        }
    }

    pub fn mode(&self) -> ProviderMode {
        self.mode
    }

    pub fn is_degraded(&self) -> bool {
        self.mode != ProviderMode::PostQuantum
    }

    pub fn kem_algorithm(&self) -> &'static str {
        KEM_ALGORITHM
    }

    pub fn signature_algorithm(&self) -> &'static str {
        SIGNATURE_ALGORITHM
    }

    fn trace_degraded(&self, op: &str) {
        if self.is_degraded() {
            debug!("degraded crypto operation: {}", op);
        }
    }

    pub fn generate_kem_keypair(&self) -> Result<KeyPair, CryptoError> {
        self.trace_degraded("generate_kem_keypair");
        self.provider.generate_kem_keypair()
    }

    pub fn generate_signature_keypair(&self) -> Result<KeyPair, CryptoError> {
        self.trace_degraded("generate_signature_keypair");
        self.provider.generate_signature_keypair()
    }

    pub fn encapsulate(&self, peer_public: &[u8]) -> Result<Encapsulation, CryptoError> {
        self.trace_degraded("encapsulate");
        self.provider.encapsulate(peer_public)
    }

    pub fn decapsulate(
        &self,
        ciphertext: &[u8],
        private_key: &[u8],
    ) -> Result<[u8; SHARED_SECRET_SIZE], CryptoError> {
        self.trace_degraded("decapsulate");
        self.provider.decapsulate(ciphertext, private_key)
    }

    pub fn sign(&self, message: &[u8], private_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.trace_degraded("sign");
        self.provider.sign(message, private_key)
    }

    pub fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        public_key: &[u8],
    ) -> Result<bool, CryptoError> {
        self.trace_degraded("verify");
        self.provider.verify(message, signature, public_key)
    }
}
