pub mod auth;
pub mod chat_requests;
pub mod convert;
pub mod crypto;
pub mod envelopes;
pub mod error;
pub mod extract;
pub mod health;
pub mod keys;
pub mod messages;
pub mod middleware;
pub mod negotiator;
pub mod routes;

#[cfg(test)]
mod testing;

pub use routes::router;

use crate::error::ApiError;

/// Run blocking database or hashing work off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?
        .map_err(ApiError::from)
}
