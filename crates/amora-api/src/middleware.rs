use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{debug, error};

use amora_types::api::{AuthContext, Claims};
use amora_types::models::SubscriptionPlan;

use crate::state::AppState;

/// Validate the bearer JWT and attach the caller's [`AuthContext`].
///
/// Users are owned by the login service; the first authenticated request
/// from an unknown id provisions its credit/VIP row.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer_token(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;
    let claims = decode_token(&state.jwt_secret, token).ok_or(StatusCode::UNAUTHORIZED)?;
    let ctx = AuthContext::from(&claims);

    let db = state.db.clone();
    tokio::task::spawn_blocking(move || {
        if !db.with_conn(|conn| amora_db::users::user_exists(conn, ctx.user_id))? {
            debug!(user_id = %ctx.user_id, "Provisioning account row");
            db.ensure_user(ctx.user_id, ctx.role, SubscriptionPlan::Free)?;
        }
        Ok::<_, anyhow::Error>(())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|e| {
        error!("Account provisioning failed: {:#}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Decode and verify an HS256 token. `None` on any failure.
pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}
