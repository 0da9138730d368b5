//! HTTP surface of the conversation & credit core.
//!
//! Every route here sits behind [`middleware::require_auth`]; handlers run
//! the synchronous core on the blocking pool and map [`amora_core::CoreError`]
//! onto status codes via [`error::ApiError`].

pub mod blocks;
pub mod chat_requests;
pub mod conversations;
pub mod credits;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod state;
pub mod vip;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::state::AppState;

/// Authenticated routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat-requests", post(chat_requests::create_request))
        .route("/chat-requests/pending", get(chat_requests::list_pending))
        .route("/chat-requests/{request_id}/accept", post(chat_requests::accept_request))
        .route("/chat-requests/{request_id}/reject", post(chat_requests::reject_request))
        .route("/admin/chat-requests/sweep", post(chat_requests::sweep_expired))
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/{conversation_id}/messages", get(conversations::list_messages))
        .route("/messages", post(messages::send_message))
        .route("/messages/{message_id}", delete(messages::delete_message))
        .route("/messages/{message_id}/read", post(messages::mark_read))
        .route("/blocks", get(blocks::list_blocked))
        .route("/blocks/{user_id}", post(blocks::block_user).delete(blocks::unblock_user))
        .route("/credits", get(credits::get_balance))
        .route("/credits/history", get(credits::get_history))
        .route("/credits/spend", post(credits::spend_credits))
        .route("/admin/credits/grant", post(credits::grant_credits))
        .route("/vip/progress", get(vip::get_progress))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use amora_core::{Services, StaticConfig};
    use amora_db::Database;
    use amora_gateway::Dispatcher;
    use amora_types::api::Claims;
    use amora_types::models::Role;

    use super::*;
    use crate::state::AppStateInner;

    const SECRET: &str = "test-secret";

    struct TestApp {
        _dir: tempfile::TempDir,
        router: Router,
    }

    impl TestApp {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let db = Arc::new(Database::open(&dir.path().join("api.db")).unwrap());
            let dispatcher = Dispatcher::new();
            let services = Services::new(
                db.clone(),
                Arc::new(dispatcher.clone()),
                Arc::new(StaticConfig::default()),
            );
            let state = Arc::new(AppStateInner {
                services,
                db,
                dispatcher,
                jwt_secret: SECRET.to_string(),
            });
            Self {
                _dir: dir,
                router: router(state),
            }
        }

        async fn call(
            &self,
            method: &str,
            uri: &str,
            who: Option<(Uuid, Role)>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut req = Request::builder().method(method).uri(uri);
            if let Some((sub, role)) = who {
                let claims = Claims {
                    sub,
                    role,
                    exp: 4_102_444_800,
                };
                let token = encode(
                    &Header::default(),
                    &claims,
                    &EncodingKey::from_secret(SECRET.as_bytes()),
                )
                .unwrap();
                req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let body = match body {
                Some(json) => {
                    req = req.header(header::CONTENT_TYPE, "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };

            let resp = self.router.clone().oneshot(req.body(body).unwrap()).await.unwrap();
            let status = resp.status();
            let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }
    }

    fn user(n: u128) -> Option<(Uuid, Role)> {
        Some((Uuid::from_u128(n), Role::User))
    }

    #[tokio::test]
    async fn rejects_missing_token() {
        let app = TestApp::new();
        let (status, _) = app.call("GET", "/conversations", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn chat_request_to_conversation_over_http() {
        let app = TestApp::new();
        let u1 = Uuid::from_u128(1);
        let u2 = Uuid::from_u128(2);
        // First request from u2 provisions their account.
        let (status, pending) = app.call("GET", "/chat-requests/pending", user(2), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending, json!([]));

        let (status, request) = app
            .call(
                "POST",
                "/chat-requests",
                user(1),
                Some(json!({ "receiver_id": u2, "first_message": "hi" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let request_id = request["id"].as_str().unwrap().to_string();

        let accept = format!("/chat-requests/{}/accept", request_id);
        let (status, _) = app.call("POST", &accept, user(1), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, accepted) = app.call("POST", &accept, user(2), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(accepted["request"]["status"], "accepted");
        assert_eq!(accepted["message"]["content"], "hi");
        let conversation_id = accepted["conversation"]["id"].as_str().unwrap().to_string();

        let (status, body) = app.call("POST", &accept, user(2), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("accepted"));

        let (status, list) = app.call("GET", "/conversations", user(2), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["unread_total"], 1);
        assert_eq!(list["conversations"][0]["counterpart_id"], json!(u1));

        let messages = format!("/conversations/{}/messages", conversation_id);
        let (status, listed) = app.call("GET", &messages, user(2), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed[0]["is_read"], true);
        let (_, list) = app.call("GET", "/conversations", user(2), None).await;
        assert_eq!(list["unread_total"], 0);
    }

    #[tokio::test]
    async fn blocked_send_is_forbidden() {
        let app = TestApp::new();
        let u2 = Uuid::from_u128(2);
        app.call("GET", "/blocks", user(2), None).await;

        let (status, body) = app.call("POST", &format!("/blocks/{}", u2), user(1), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["blocked"], true);

        let (status, body) = app
            .call(
                "POST",
                "/messages",
                user(2),
                Some(json!({ "receiver_id": Uuid::from_u128(1), "content": "hello" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Forbidden: blocked");

        let (status, _) = app
            .call("POST", "/messages", user(1), Some(json!({ "content": "nowhere" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn credits_need_capability_and_balance() {
        let app = TestApp::new();
        let admin = Some((Uuid::from_u128(100), Role::Admin));
        let u1 = Uuid::from_u128(1);
        app.call("GET", "/credits", user(1), None).await;

        let (status, body) = app
            .call(
                "POST",
                "/credits/spend",
                user(1),
                Some(json!({ "amount": 30, "description": "boost" })),
            )
            .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert!(body["error"].as_str().unwrap().contains("Insufficient"));

        let grant = json!({ "user_id": u1, "amount": 50, "description": "welcome" });
        let (status, _) = app
            .call("POST", "/admin/credits/grant", user(1), Some(grant.clone()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, entry) = app
            .call("POST", "/admin/credits/grant", admin.clone(), Some(grant))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(entry["transaction_type"], "refill");

        let (status, _) = app
            .call(
                "POST",
                "/credits/spend",
                user(1),
                Some(json!({ "amount": 30, "description": "boost" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, balance) = app.call("GET", "/credits", user(1), None).await;
        assert_eq!(balance["credits"], 20);
        assert_eq!(balance["total_credits_spent"], 30);

        let (_, history) = app.call("GET", "/credits/history?page=1", user(1), None).await;
        assert_eq!(history["total"], 2);
        assert_eq!(history["items"][0]["amount"], -30);

        let other = format!("/credits/history?user_id={}", u1);
        let (status, _) = app.call("GET", &other, user(2), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.call("GET", &other, admin, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, progress) = app.call("GET", "/vip/progress", user(1), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(progress["window_spend"], 30);
    }
}
