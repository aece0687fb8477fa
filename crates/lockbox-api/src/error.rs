use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use lockbox_crypto::CryptoError;
use lockbox_types::api::ErrorBody;
use lockbox_types::models::RequestStatus;

/// Every failure the HTTP boundary can report. Each variant maps to a
/// stable `error` kind string and a status code; messages never carry
/// internal detail or key material.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("action must be 'accept' or 'decline'")]
    InvalidAction,

    #[error("{0}")]
    NotFound(String),

    #[error("recipient not found")]
    UnknownRecipient,

    #[error("a pending chat request to this recipient already exists")]
    DuplicateRequest,

    #[error("chat request is already {0}")]
    InvalidState(RequestStatus),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("missing or invalid session token")]
    Unauthorized,

    #[error("cryptographic provider unavailable")]
    ProviderUnavailable,

    #[error("internal error")]
    Infrastructure(#[from] anyhow::Error),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InvalidAction => "invalid_action",
            Self::NotFound(_) => "not_found",
            Self::UnknownRecipient => "unknown_recipient",
            Self::DuplicateRequest => "duplicate_request",
            Self::InvalidState(_) => "invalid_state",
            Self::Conflict(_) => "conflict",
            Self::Forbidden(_) => "forbidden",
            Self::Unauthorized => "unauthorized",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::Infrastructure(_) => "infrastructure",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidAction => StatusCode::BAD_REQUEST,
            Self::NotFound(_) | Self::UnknownRecipient => StatusCode::NOT_FOUND,
            Self::DuplicateRequest | Self::InvalidState(_) | Self::Conflict(_) => {
                StatusCode::CONFLICT
            }
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub(crate) fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Infrastructure(e) = &self {
            error!("Request failed: {:#}", e);
        }

        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<CryptoError> for ApiError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidKeyLength { .. } | CryptoError::InvalidEncoding(_) => {
                Self::Validation(e.to_string())
            }
            CryptoError::ProviderUnavailable | CryptoError::InsecureModeRefused => {
                Self::ProviderUnavailable
            }
            CryptoError::Provider(_) => Self::Infrastructure(anyhow::Error::new(e)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_and_statuses_are_stable() {
        let cases = [
            (ApiError::validation("bad"), "validation", StatusCode::BAD_REQUEST),
            (ApiError::InvalidAction, "invalid_action", StatusCode::BAD_REQUEST),
            (ApiError::UnknownRecipient, "unknown_recipient", StatusCode::NOT_FOUND),
            (ApiError::DuplicateRequest, "duplicate_request", StatusCode::CONFLICT),
            (
                ApiError::InvalidState(RequestStatus::Accepted),
                "invalid_state",
                StatusCode::CONFLICT,
            ),
            (ApiError::forbidden("no"), "forbidden", StatusCode::FORBIDDEN),
            (
                ApiError::ProviderUnavailable,
                "provider_unavailable",
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, kind, status) in cases {
            assert_eq!(err.kind(), kind);
            assert_eq!(err.status(), status);
        }
    }

    #[test]
    fn infrastructure_message_hides_detail() {
        let err = ApiError::from(anyhow::anyhow!("disk I/O error at /var/lib/lockbox.db"));
        assert_eq!(err.to_string(), "internal error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn crypto_errors_map_to_validation_or_unavailable() {
        let err = ApiError::from(CryptoError::InvalidEncoding("ciphertext"));
        assert_eq!(err.kind(), "validation");
        assert_eq!(err.to_string(), "ciphertext is not valid base64");

        let err = ApiError::from(CryptoError::ProviderUnavailable);
        assert_eq!(err.kind(), "provider_unavailable");
    }
}
