pub mod auth;
pub mod chat;
pub mod conversations;
pub mod error;
pub mod middleware;
pub mod password;
pub mod router;
pub mod session;
pub mod tokens;

use tracing::error;

use crate::error::{ServiceError, ServiceResult};

/// Run store and hashing work off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> ServiceResult<T>
where
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ServiceError::internal()
    })?
}
