use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use amora_core::{OutgoingMessage, Recipient};
use amora_types::api::{AuthContext, SendMessageRequest};

use crate::error::{ApiError, blocking};
use crate::state::AppState;

pub async fn send_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let recipient = Recipient::from_parts(req.conversation_id, req.receiver_id)?;
    let outgoing = OutgoingMessage {
        content: req.content,
        media_url: req.media_url,
        message_type: req.message_type,
    };
    let message =
        blocking(move || state.services.messages.send(ctx.user_id, recipient, outgoing)).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    let message =
        blocking(move || state.services.messages.mark_read(message_id, ctx.user_id)).await?;
    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || state.services.messages.soft_delete(message_id, ctx.user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
