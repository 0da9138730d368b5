use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use amora_types::api::{AuthContext, ConversationListResponse};

use crate::error::{ApiError, blocking};
use crate::state::AppState;

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    let response = blocking(move || {
        let directory = &state.services.conversations;
        Ok(ConversationListResponse {
            conversations: directory.summaries_for(ctx.user_id)?,
            unread_total: directory.unread_total(ctx.user_id)?,
        })
    })
    .await?;
    Ok(Json(response))
}

/// Listing marks the caller's incoming messages read.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = blocking(move || {
        state
            .services
            .messages
            .list_for_conversation(conversation_id, ctx.user_id)
    })
    .await?;
    Ok(Json(messages))
}
