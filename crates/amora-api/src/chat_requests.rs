use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use amora_core::auth;
use amora_types::api::{
    AcceptChatRequestResponse, AuthContext, CreateChatRequestRequest, SweepResponse,
};
use amora_types::models::Capability;

use crate::error::{ApiError, blocking};
use crate::state::AppState;

pub async fn create_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CreateChatRequestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request = blocking(move || {
        state
            .services
            .chat_requests
            .create(ctx.user_id, req.receiver_id, &req.first_message)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_pending(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    let requests =
        blocking(move || state.services.chat_requests.list_pending_for(ctx.user_id)).await?;
    Ok(Json(requests))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    let accepted =
        blocking(move || state.services.chat_requests.accept(request_id, ctx.user_id)).await?;
    Ok(Json(AcceptChatRequestResponse {
        request: accepted.request,
        conversation: accepted.conversation,
        message: accepted.message,
    }))
}

pub async fn reject_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    let request =
        blocking(move || state.services.chat_requests.reject(request_id, ctx.user_id)).await?;
    Ok(Json(request))
}

/// Run the expiry sweep now instead of waiting for the background interval.
pub async fn sweep_expired(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    auth::require(&ctx, Capability::SweepRequests)?;
    let expired = blocking(move || state.services.chat_requests.sweep_expired()).await?;
    Ok(Json(SweepResponse { expired }))
}
