use std::sync::Arc;

use askama::Template;
use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use verba_core::attachment::Attachment;
use verba_core::chat::TurnInput;
use verba_core::error::VerbaError;
use verba_core::model::{format_timestamp, ChatMessage};

use crate::auth::CurrentUser;
use crate::error::{ApiError, AppError};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(show).post(exchange))
}

// -- Templates --

#[derive(Template)]
#[template(path = "chat.html")]
struct ChatTemplate {
    username: String,
    messages: Vec<MessageView>,
    error: Option<String>,
}

struct MessageView {
    css_class: &'static str,
    content: String,
    timestamp: String,
    time_label: String,
}

impl From<&ChatMessage> for MessageView {
    fn from(message: &ChatMessage) -> Self {
        Self {
            css_class: if message.is_user() {
                "user-message"
            } else {
                "ai-message"
            },
            content: message.content.clone(),
            timestamp: format_timestamp(&message.created_at),
            time_label: message.created_at.format("%H:%M").to_string(),
        }
    }
}

const CHAT_UNAVAILABLE: &str = "Chat is unavailable: the AI client is not initialized.";
const CHAT_LOAD_FAILED: &str = "Failed to load chat.";

// -- Payload --

#[derive(Debug, Default, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    bot_response: String,
    timestamp: String,
}

/// A chat turn from either a JSON body or a multipart form.
#[derive(Debug)]
struct ChatPayload(TurnInput);

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

impl<S> FromRequest<S> for ChatPayload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_multipart(&req) {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
            return read_form(multipart).await.map(ChatPayload);
        }

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
        let parsed: ChatRequest = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!("invalid JSON data received: {e}");
            ApiError::bad_request("Invalid JSON data")
        })?;
        Ok(ChatPayload(TurnInput::text(parsed.message)))
    }
}

async fn read_form(mut multipart: Multipart) -> Result<TurnInput, ApiError> {
    let form_error = |e: axum::extract::multipart::MultipartError| {
        tracing::warn!("failed to read multipart: {e}");
        let status = e.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::new(status, "File is too large")
        } else {
            ApiError::bad_request("Invalid form data")
        }
    };

    let mut input = TurnInput::default();
    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "message" => input.message = field.text().await.map_err(form_error)?,
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(form_error)?;
                // Browsers send an empty part when no file was picked.
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                input.attachment = Some(Attachment::new(file_name, content_type, bytes.to_vec()));
            }
            _ => {}
        }
    }
    Ok(input)
}

// -- Handlers --

async fn show(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, AppError> {
    let (status, messages, error) = match state.chat.open_session(user.id).await {
        Ok(page) => (StatusCode::OK, page.messages, page.greeting_error),
        Err(VerbaError::Unavailable(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Vec::new(),
            Some(CHAT_UNAVAILABLE.to_string()),
        ),
        Err(e) => {
            tracing::error!(user = %user.id, "failed to load chat: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Vec::new(),
                Some(CHAT_LOAD_FAILED.to_string()),
            )
        }
    };

    let tmpl = ChatTemplate {
        username: user.username,
        messages: messages.iter().map(MessageView::from).collect(),
        error,
    };
    Ok((status, Html(tmpl.render()?)).into_response())
}

async fn exchange(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ChatPayload(input): ChatPayload,
) -> Result<Json<ChatResponse>, ApiError> {
    let turn = state.chat.exchange(user.id, input).await?;
    Ok(Json(ChatResponse {
        bot_response: turn.reply.content,
        timestamp: format_timestamp(&turn.reply.created_at),
    }))
}
