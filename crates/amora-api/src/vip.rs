use axum::{Extension, Json, extract::State, response::IntoResponse};

use amora_types::api::AuthContext;

use crate::error::{ApiError, blocking};
use crate::state::AppState;

pub async fn get_progress(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    let progress = blocking(move || state.services.vip.progress(ctx.user_id)).await?;
    Ok(Json(progress))
}
