use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use amora_types::api::{AuthContext, BlockResponse};

use crate::error::{ApiError, blocking};
use crate::state::AppState;

pub async fn block_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || state.services.blocks.block(ctx.user_id, user_id)).await?;
    Ok(Json(BlockResponse { blocked: true }))
}

pub async fn unblock_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || state.services.blocks.unblock(ctx.user_id, user_id)).await?;
    Ok(Json(BlockResponse { blocked: false }))
}

pub async fn list_blocked(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    let blocks = blocking(move || state.services.blocks.list_blocked_by(ctx.user_id)).await?;
    Ok(Json(blocks))
}
