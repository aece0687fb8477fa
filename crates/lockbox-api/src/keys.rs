//! Public key bundle directory. Only public halves are ever accepted here.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::info;

use lockbox_crypto::keys::{
    KEM_PUBLIC_KEY_SIZE, SIGNATURE_PUBLIC_KEY_SIZE, check_len, from_base64, to_base64,
};
use lockbox_types::api::{Claims, KeyBundleResponse, PublishKeyBundleRequest};

use crate::auth::AppState;
use crate::convert::{self, now_timestamp, parse_timestamp};
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::run_blocking;

/// Publish or replace the caller's bundle. Both keys are replaced together.
pub async fn publish_bundle(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<PublishKeyBundleRequest>,
) -> Result<Json<KeyBundleResponse>, ApiError> {
    let kem_public_key = from_base64("kem_public_key", &req.kem_public_key)?;
    check_len("kem_public_key", &kem_public_key, KEM_PUBLIC_KEY_SIZE)?;
    let signature_public_key = from_base64("signature_public_key", &req.signature_public_key)?;
    check_len(
        "signature_public_key",
        &signature_public_key,
        SIGNATURE_PUBLIC_KEY_SIZE,
    )?;

    let updated_at = now_timestamp();
    let db = state.clone();
    let (identity, kem, sig, ts) = (
        claims.sub.to_string(),
        kem_public_key.clone(),
        signature_public_key.clone(),
        updated_at.clone(),
    );
    run_blocking(move || db.db.upsert_key_bundle(&identity, &kem, &sig, &ts)).await?;

    info!("{} ({}) published a key bundle", claims.username, claims.sub);

    Ok(Json(KeyBundleResponse {
        identity_id: claims.sub,
        username: claims.username,
        kem_public_key: to_base64(&kem_public_key),
        signature_public_key: to_base64(&signature_public_key),
        updated_at: parse_timestamp(&updated_at, "published key bundle"),
    }))
}

/// Fetch a peer's bundle by id or username.
pub async fn get_bundle(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Result<Json<KeyBundleResponse>, ApiError> {
    let db = state.clone();
    let (user, bundle) = run_blocking(move || {
        let Some(user) = db.db.resolve_user(&identity)? else {
            return Ok(None);
        };
        let bundle = db.db.get_key_bundle(&user.id)?;
        Ok(Some((user, bundle)))
    })
    .await?
    .ok_or_else(|| ApiError::not_found("identity not found"))?;

    let identity = convert::identity(user);
    let bundle = bundle
        .map(convert::key_bundle)
        .ok_or_else(|| ApiError::not_found("no key bundle published"))?;

    Ok(Json(KeyBundleResponse {
        identity_id: identity.id,
        username: identity.username,
        kem_public_key: to_base64(&bundle.kem_public_key),
        signature_public_key: to_base64(&bundle.signature_public_key),
        updated_at: bundle.updated_at,
    }))
}
