use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use amora_core::CoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The blocking task panicked or was cancelled.
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Core(core) => match core {
                CoreError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
                CoreError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
                CoreError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
                CoreError::Conflict(_) | CoreError::AlreadyProcessed(_) => {
                    (StatusCode::CONFLICT, self.to_string())
                }
                CoreError::InsufficientCredits { .. } => {
                    (StatusCode::PAYMENT_REQUIRED, self.to_string())
                }
                CoreError::Internal(e) => {
                    error!("Internal error: {:#}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
                }
            },
            ApiError::Worker(e) => {
                error!("spawn_blocking join error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Run a core call off the async runtime.
pub async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> amora_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Worker(e.to_string()))??)
}

#[cfg(test)]
mod tests {
    use super::*;
    use amora_types::models::ChatRequestStatus;

    fn status_of(err: CoreError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn core_errors_map_to_status_codes() {
        assert_eq!(status_of(CoreError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(CoreError::NotFound("message")), StatusCode::NOT_FOUND);
        assert_eq!(status_of(CoreError::Forbidden("blocked".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_of(CoreError::Conflict("dup".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(CoreError::AlreadyProcessed(ChatRequestStatus::Accepted)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CoreError::InsufficientCredits { balance: 1, required: 2 }),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_of(CoreError::Internal(anyhow::anyhow!("disk on fire"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn blocking_propagates_core_errors() {
        let result: Result<(), ApiError> =
            blocking(|| Err(CoreError::NotFound("conversation"))).await;
        assert!(matches!(result, Err(ApiError::Core(CoreError::NotFound("conversation")))));
    }
}
