pub mod accounts;
pub mod chat;

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use verba_core::storage::StorageBackend;

use crate::AppState;

const CHAT_JS: &str = include_str!("../../static/chat.js");

/// Room for the multipart framing and the message field on top of the file.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/static/chat.js", get(chat_js))
        .merge(chat::routes())
        .merge(accounts::routes())
        .fallback(not_found)
}

/// The full application: routes, body limit, request tracing and state.
pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = state
        .config
        .uploads
        .max_bytes
        .saturating_add(FORM_OVERHEAD_BYTES);

    router()
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = state.storage.ping().await.is_ok();

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let llm = state
        .chat
        .llm()
        .map(|llm| llm.provider_name())
        .unwrap_or("unavailable");
    (
        status,
        Json(serde_json::json!({
            "status": if db_ok { "ok" } else { "degraded" },
            "database": if db_ok { "connected" } else { "unavailable" },
            "llm": llm,
        })),
    )
}

async fn chat_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        CHAT_JS,
    )
}

async fn not_found() -> (StatusCode, Html<String>) {
    let body = r#"<!doctype html>
<html><head><title>404 · Verba</title>
<style>body{font-family:system-ui;background:#f4f5f7;color:#222;display:flex;justify-content:center;align-items:center;height:100vh;margin:0}
.box{text-align:center}
h1{font-size:4rem;color:#3b6fd8;margin:0}
p{color:#666;margin:0.5rem 0 1.5rem}
a{color:#3b6fd8;text-decoration:none;padding:0.5rem 1rem;border:1px solid #cfd6e4;border-radius:8px}</style>
</head><body><div class="box"><h1>404</h1><p>This page doesn't exist.</p><a href="/">Back to chat</a></div></body></html>"#;
    (StatusCode::NOT_FOUND, Html(body.to_string()))
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    #[tokio::test]
    async fn test_health_reports_provider() {
        let state = test_state(Some(echo_llm()));
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, _, body) = send(test_app(&state), req).await;

        assert_eq!(status, StatusCode::OK);
        let json = json(&body);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["database"], "connected");
        assert_eq!(json["llm"], "echo");
    }

    #[tokio::test]
    async fn test_health_without_client() {
        let state = test_state(None);
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, _, body) = send(test_app(&state), req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["llm"], "unavailable");
    }

    #[tokio::test]
    async fn test_unknown_path_is_html_404() {
        let state = test_state(None);
        let req = Request::builder()
            .uri("/no/such/page")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(test_app(&state), req).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        assert!(String::from_utf8(body).unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_chat_js_served() {
        let state = test_state(None);
        let req = Request::builder()
            .uri("/static/chat.js")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(test_app(&state), req).await;

        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/javascript"));
        assert!(String::from_utf8(body).unwrap().contains("bot_response"));
    }
}
