//! Key material endpoints. Every response states whether it came from the
//! degraded provider; key material itself is never logged or stored.

use axum::{Json, extract::State};

use lockbox_crypto::keys::{from_base64, to_base64};
use lockbox_types::api::{
    DecapsulateRequest, DecapsulateResponse, EncapsulateRequest, EncapsulateResponse,
    GenerateKeypairRequest, KeyKind, KeypairResponse, SignRequest, SignResponse, VerifyRequest,
    VerifyResponse,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::ApiJson;

pub async fn generate_keypair(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<GenerateKeypairRequest>,
) -> Result<Json<KeypairResponse>, ApiError> {
    let crypto = &state.crypto;
    let (pair, algorithm) = match req.kind {
        KeyKind::Kem => (crypto.generate_kem_keypair()?, crypto.kem_algorithm()),
        KeyKind::Signature => (
            crypto.generate_signature_keypair()?,
            crypto.signature_algorithm(),
        ),
    };

    Ok(Json(KeypairResponse {
        kind: req.kind,
        algorithm: algorithm.to_string(),
        public_key: to_base64(&pair.public_key),
        private_key: to_base64(&pair.private_key),
        degraded: crypto.is_degraded(),
    }))
}

pub async fn encapsulate(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<EncapsulateRequest>,
) -> Result<Json<EncapsulateResponse>, ApiError> {
    let public_key = from_base64("public_key", &req.public_key)?;
    let encapsulation = state.crypto.encapsulate(&public_key)?;

    Ok(Json(EncapsulateResponse {
        ciphertext: to_base64(&encapsulation.ciphertext),
        shared_secret: to_base64(&encapsulation.shared_secret),
        degraded: state.crypto.is_degraded(),
    }))
}

pub async fn decapsulate(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<DecapsulateRequest>,
) -> Result<Json<DecapsulateResponse>, ApiError> {
    let ciphertext = from_base64("ciphertext", &req.ciphertext)?;
    let private_key = from_base64("private_key", &req.private_key)?;
    let shared_secret = state.crypto.decapsulate(&ciphertext, &private_key)?;

    Ok(Json(DecapsulateResponse {
        shared_secret: to_base64(&shared_secret),
        degraded: state.crypto.is_degraded(),
    }))
}

pub async fn sign(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignRequest>,
) -> Result<Json<SignResponse>, ApiError> {
    let message = from_base64("message", &req.message)?;
    let private_key = from_base64("private_key", &req.private_key)?;
    let signature = state.crypto.sign(&message, &private_key)?;

    Ok(Json(SignResponse {
        signature: to_base64(&signature),
        degraded: state.crypto.is_degraded(),
    }))
}

/// A well-formed but wrong signature is `valid: false`, not an error.
pub async fn verify(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let message = from_base64("message", &req.message)?;
    let signature = from_base64("signature", &req.signature)?;
    let public_key = from_base64("public_key", &req.public_key)?;
    let valid = state.crypto.verify(&message, &signature, &public_key)?;

    Ok(Json(VerifyResponse {
        valid,
        degraded: state.crypto.is_degraded(),
    }))
}
