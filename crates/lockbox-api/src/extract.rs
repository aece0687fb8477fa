use axum::extract::FromRequest;

use crate::error::ApiError;

/// `Json` whose rejections come back in the standard error shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
