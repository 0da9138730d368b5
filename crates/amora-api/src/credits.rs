use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use amora_core::auth;
use amora_types::api::{AuthContext, BalanceResponse, GrantCreditsRequest, SpendCreditsRequest};
use amora_types::models::Capability;

use crate::error::{ApiError, blocking};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    /// Another user's ledger; needs `ViewAnyLedger`.
    pub user_id: Option<Uuid>,
}

fn default_page() -> u32 {
    1
}

pub async fn get_balance(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    let account = blocking(move || state.services.credits.account(ctx.user_id)).await?;
    Ok(Json(BalanceResponse {
        user_id: account.id,
        credits: account.credits,
        total_credits_spent: account.total_credits_spent,
        vip_active: account.vip_active,
    }))
}

pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = match query.user_id {
        Some(other) if other != ctx.user_id => {
            auth::require(&ctx, Capability::ViewAnyLedger)?;
            other
        }
        _ => ctx.user_id,
    };
    let page = blocking(move || state.services.credits.history_of(user_id, query.page)).await?;
    Ok(Json(page))
}

pub async fn spend_credits(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<SpendCreditsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = blocking(move || {
        state
            .services
            .credits
            .spend(ctx.user_id, req.amount, &req.description, req.relation)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn grant_credits(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<GrantCreditsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth::require(&ctx, Capability::GrantCredits)?;
    let entry = blocking(move || {
        state.services.credits.credit(
            req.user_id,
            req.amount,
            req.transaction_type,
            &req.description,
            req.relation,
        )
    })
    .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}
