use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use verba_core::error::VerbaError;

pub const FAILED_TO_GENERATE: &str = "Failed to generate response";
pub const UNEXPECTED: &str = "An unexpected error occurred";

/// Application error type that renders as an HTML error page.
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("web error: {:#}", self.0);

        let body = r#"<!doctype html>
<html><head><title>Error · Verba</title>
<style>body{font-family:system-ui;background:#f4f5f7;color:#222;display:flex;justify-content:center;align-items:center;height:100vh;margin:0}
.err{background:#fff;padding:2rem;border-radius:8px;border-left:4px solid #d64545;max-width:600px}
h1{color:#d64545;margin-top:0}</style>
</head><body><div class="err"><h1>Something went wrong</h1>
<p>The server hit an unexpected error. Please try again.</p>
<p><a href="/">Back to chat</a></p></div></body></html>"#;
        (StatusCode::INTERNAL_SERVER_ERROR, Html(body.to_string())).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// JSON error for the chat endpoint: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Authentication required")
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<VerbaError> for ApiError {
    fn from(err: VerbaError) -> Self {
        match err {
            VerbaError::InvalidInput(msg) => Self::bad_request(msg),
            VerbaError::Auth(_) => Self::unauthorized(),
            VerbaError::Unavailable(msg) => {
                tracing::warn!("chat unavailable: {msg}");
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Chat is unavailable right now",
                )
            }
            e if e.is_external() => {
                tracing::error!("completion error: {e}");
                Self::internal(FAILED_TO_GENERATE)
            }
            e => {
                tracing::error!("unexpected error: {e}");
                Self::internal(UNEXPECTED)
            }
        }
    }
}
