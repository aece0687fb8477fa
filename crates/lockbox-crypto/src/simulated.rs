use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;
use crate::keys::{
    Encapsulation, KEM_CIPHERTEXT_SIZE, KEM_PRIVATE_KEY_SIZE, KEM_PUBLIC_KEY_SIZE, KeyPair,
    SHARED_SECRET_SIZE, SIGNATURE_PRIVATE_KEY_SIZE, SIGNATURE_PUBLIC_KEY_SIZE, SIGNATURE_SIZE,
    check_len,
};
use crate::provider::KeyMaterialProvider;

const KEM_PUBLIC_LABEL: &[u8] = b"lockbox-sim/kem-public";
const SHARED_SECRET_LABEL: &[u8] = b"lockbox-sim/shared-secret";
const SIG_PUBLIC_LABEL: &[u8] = b"lockbox-sim/sig-public";
const SIG_TAG_LABEL: &[u8] = b"lockbox-sim/sig-tag";
const SIG_PAD_LABEL: &[u8] = b"lockbox-sim/sig-pad";

/// Stand-in used only when the process was explicitly started in insecure
/// mode. Sizes and round-trips match the real parameter set, but every
/// "secret" here is computable from public data. Not for production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedProvider;

fn random_bytes(len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    OsRng.fill_bytes(&mut out);
    out
}

/// SHA-256 in counter mode, truncated to `len`.
fn expand(label: &[u8], seed: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 32);
    let mut counter: u32 = 0;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(label);
        hasher.update(counter.to_be_bytes());
        hasher.update(seed);
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(len);
    out
}

fn digest(label: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(label);
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn signature_for(public_key: &[u8], message: &[u8]) -> Vec<u8> {
    let tag = digest(SIG_TAG_LABEL, &[public_key, message]);
    let mut signature = tag.to_vec();
    signature.extend(expand(SIG_PAD_LABEL, &tag, SIGNATURE_SIZE - tag.len()));
    signature
}

impl KeyMaterialProvider for SimulatedProvider {
    fn generate_kem_keypair(&self) -> Result<KeyPair, CryptoError> {
        let private_key = random_bytes(KEM_PRIVATE_KEY_SIZE);
        let public_key = expand(KEM_PUBLIC_LABEL, &private_key, KEM_PUBLIC_KEY_SIZE);
        Ok(KeyPair {
            public_key,
            private_key,
        })
    }

    fn generate_signature_keypair(&self) -> Result<KeyPair, CryptoError> {
        let private_key = random_bytes(SIGNATURE_PRIVATE_KEY_SIZE);
        let public_key = expand(SIG_PUBLIC_LABEL, &private_key, SIGNATURE_PUBLIC_KEY_SIZE);
        Ok(KeyPair {
            public_key,
            private_key,
        })
    }

    fn encapsulate(&self, peer_public: &[u8]) -> Result<Encapsulation, CryptoError> {
        check_len("KEM public key", peer_public, KEM_PUBLIC_KEY_SIZE)?;
        let ciphertext = random_bytes(KEM_CIPHERTEXT_SIZE);
        let shared_secret = digest(SHARED_SECRET_LABEL, &[peer_public, &ciphertext]);
        Ok(Encapsulation {
            ciphertext,
            shared_secret,
        })
    }

    fn decapsulate(
        &self,
        ciphertext: &[u8],
        private_key: &[u8],
    ) -> Result<[u8; SHARED_SECRET_SIZE], CryptoError> {
        check_len("KEM ciphertext", ciphertext, KEM_CIPHERTEXT_SIZE)?;
        check_len("KEM private key", private_key, KEM_PRIVATE_KEY_SIZE)?;
        let public_key = expand(KEM_PUBLIC_LABEL, private_key, KEM_PUBLIC_KEY_SIZE);
        Ok(digest(SHARED_SECRET_LABEL, &[&public_key, ciphertext]))
    }

    fn sign(&self, message: &[u8], private_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        check_len("signature private key", private_key, SIGNATURE_PRIVATE_KEY_SIZE)?;
        let public_key = expand(SIG_PUBLIC_LABEL, private_key, SIGNATURE_PUBLIC_KEY_SIZE);
        Ok(signature_for(&public_key, message))
    }

    fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        public_key: &[u8],
    ) -> Result<bool, CryptoError> {
        check_len("signature public key", public_key, SIGNATURE_PUBLIC_KEY_SIZE)?;
        if signature.len() != SIGNATURE_SIZE {
            return Ok(false);
        }
        Ok(signature == signature_for(public_key, message).as_slice())
    }
}
