use ml_dsa::{
    EncodedSignature, EncodedSigningKey, EncodedVerifyingKey, KeyGen, MlDsa87, Signature,
    SigningKey, VerifyingKey,
};
use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Ciphertext, Encoded, EncodedSizeUser, KemCore, MlKem1024};
use rand_core::OsRng;
use signature::{Signer, Verifier};

use crate::error::CryptoError;
use crate::keys::{
    Encapsulation, KEM_CIPHERTEXT_SIZE, KEM_PRIVATE_KEY_SIZE, KEM_PUBLIC_KEY_SIZE, KeyPair,
    SHARED_SECRET_SIZE, SIGNATURE_PRIVATE_KEY_SIZE, SIGNATURE_PUBLIC_KEY_SIZE, SIGNATURE_SIZE,
    check_len,
};
use crate::provider::KeyMaterialProvider;

type KemEncapsulationKey = <MlKem1024 as KemCore>::EncapsulationKey;
type KemDecapsulationKey = <MlKem1024 as KemCore>::DecapsulationKey;

/// ML-KEM-1024 (FIPS 203) and ML-DSA-87 (FIPS 204), NIST security level 5.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostQuantumProvider;

impl KeyMaterialProvider for PostQuantumProvider {
    fn generate_kem_keypair(&self) -> Result<KeyPair, CryptoError> {
        let (dk, ek) = MlKem1024::generate(&mut OsRng);
        Ok(KeyPair {
            public_key: ek.as_bytes().to_vec(),
            private_key: dk.as_bytes().to_vec(),
        })
    }

    fn generate_signature_keypair(&self) -> Result<KeyPair, CryptoError> {
        let kp = MlDsa87::key_gen(&mut OsRng);
        Ok(KeyPair {
            public_key: kp.verifying_key().encode().to_vec(),
            private_key: kp.signing_key().encode().to_vec(),
        })
    }

    fn encapsulate(&self, peer_public: &[u8]) -> Result<Encapsulation, CryptoError> {
        check_len("KEM public key", peer_public, KEM_PUBLIC_KEY_SIZE)?;
        let encoded: Encoded<KemEncapsulationKey> = peer_public
            .try_into()
            .map_err(|_| CryptoError::Provider("KEM public key decode"))?;
        let ek = KemEncapsulationKey::from_bytes(&encoded);

        let (ct, shared) = ek
            .encapsulate(&mut OsRng)
            .map_err(|_| CryptoError::Provider("encapsulation"))?;

        let mut shared_secret = [0u8; SHARED_SECRET_SIZE];
        shared_secret.copy_from_slice(&shared);
        Ok(Encapsulation {
            ciphertext: ct.to_vec(),
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

        let encoded: Encoded<KemDecapsulationKey> = private_key
            .try_into()
            .map_err(|_| CryptoError::Provider("KEM private key decode"))?;
        let dk = KemDecapsulationKey::from_bytes(&encoded);
        let ct: Ciphertext<MlKem1024> = ciphertext
            .try_into()
            .map_err(|_| CryptoError::Provider("KEM ciphertext decode"))?;

        // Implicit rejection: a tampered ciphertext yields an unrelated secret.
        let shared = dk
            .decapsulate(&ct)
            .map_err(|_| CryptoError::Provider("decapsulation"))?;

        let mut shared_secret = [0u8; SHARED_SECRET_SIZE];
        shared_secret.copy_from_slice(&shared);
        Ok(shared_secret)
    }

    fn sign(&self, message: &[u8], private_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        check_len("signature private key", private_key, SIGNATURE_PRIVATE_KEY_SIZE)?;
        let encoded: EncodedSigningKey<MlDsa87> = private_key
            .try_into()
            .map_err(|_| CryptoError::Provider("signing key decode"))?;
        let sk = SigningKey::<MlDsa87>::decode(&encoded);

        let signature: Signature<MlDsa87> = sk
            .try_sign(message)
            .map_err(|_| CryptoError::Provider("signing"))?;
        Ok(signature.encode().to_vec())
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

        let encoded_vk: EncodedVerifyingKey<MlDsa87> = public_key
            .try_into()
            .map_err(|_| CryptoError::Provider("verifying key decode"))?;
        let vk = VerifyingKey::<MlDsa87>::decode(&encoded_vk);

        let encoded_sig: EncodedSignature<MlDsa87> = match signature.try_into() {
            Ok(sig) => sig,
            Err(_) => return Ok(false),
        };
        let Some(signature) = Signature::<MlDsa87>::decode(&encoded_sig) else {
            return Ok(false);
        };

        Ok(vk.verify(message, &signature).is_ok())
    }
}
