use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use lockbox_crypto::KeyMaterialService;
use lockbox_db::Database;
use lockbox_db::models::CreateUserOutcome;
use lockbox_gateway::dispatcher::Dispatcher;
use lockbox_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::convert::now_timestamp;
use crate::envelopes::ConversationPolicy;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::run_blocking;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub crypto: KeyMaterialService,
    pub conversation_policy: ConversationPolicy,
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::validation("username must be 3-32 characters"));
    }
    if !req
        .username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(ApiError::validation(
            "username may only contain letters, digits, '_', '-' and '.'",
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::validation("password must be at least 8 characters"));
    }

    let identity_id = Uuid::new_v4();
    let username = req.username.clone();

    let db = state.clone();
    let outcome = run_blocking(move || {
        // Cheap early exit; the UNIQUE constraint settles races below
        if db.db.username_exists(&req.username)? {
            return Ok(CreateUserOutcome::UsernameTaken);
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();

        db.db.create_user(
            &identity_id.to_string(),
            &req.username,
            &password_hash,
            &now_timestamp(),
        )
    })
    .await?;
    if outcome == CreateUserOutcome::UsernameTaken {
        return Err(ApiError::Conflict("username already taken".into()));
    }

    let token = create_token(&state.jwt_secret, identity_id, &username)?;
    info!("Registered {} ({})", username, identity_id);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { identity_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let user = run_blocking(move || {
        let Some(user) = db.db.get_user_by_username(&req.username)? else {
            return Ok(None);
        };

        // Verify password
        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow::anyhow!("stored password hash unreadable: {}", e))?;
        let verified = Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .is_ok();

        Ok(verified.then_some(user))
    })
    .await?
    .ok_or(ApiError::Unauthorized)?;

    let identity_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;

    let token = create_token(&state.jwt_secret, identity_id, &user.username)?;

    Ok(Json(LoginResponse {
        identity_id,
        username: user.username,
        token,
    }))
}

fn create_token(secret: &str, identity_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: identity_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
