use std::sync::Arc;

use askama::Template;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use verba_core::auth::{hash_password, verify_password};
use verba_core::error::VerbaError;
use verba_core::model::validate_signup;
use verba_core::storage::StorageBackend;

use crate::auth::{expired_session_cookie, login_token, session_cookie};
use crate::error::AppError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/signup/", get(signup_form).post(signup))
        .route("/login/", get(login_form).post(login))
        .route("/logout/", get(logout).post(logout))
}

// -- Templates --

#[derive(Template)]
#[template(path = "signup.html")]
struct SignupTemplate {
    username: String,
    errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    username: String,
    next: String,
    error: Option<String>,
}

const BAD_CREDENTIALS: &str = "Please enter a correct username and password.";

// -- Forms --

#[derive(Debug, Default, Deserialize)]
struct SignupForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password1: String,
    #[serde(default)]
    password2: String,
}

#[derive(Debug, Default, Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NextQuery {
    next: Option<String>,
}

/// Only same-site paths are followed after login.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => "/",
    }
}

// -- Handlers --

async fn signup_form() -> Result<Html<String>, AppError> {
    let tmpl = SignupTemplate {
        username: String::new(),
        errors: Vec::new(),
    };
    Ok(Html(tmpl.render()?))
}

async fn signup(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SignupForm>,
) -> Result<Response, AppError> {
    let username = form.username.trim().to_string();

    let mut errors = match validate_signup(&username, &form.password1, &form.password2) {
        Ok(()) => Vec::new(),
        Err(VerbaError::InvalidInput(msg)) => msg.split("; ").map(str::to_string).collect(),
        Err(e) => return Err(e.into()),
    };
    if errors.is_empty() && state.storage.find_user_by_username(&username).await?.is_some() {
        errors.push("A user with that username already exists.".to_string());
    }

    if errors.is_empty() {
        let password = form.password1.clone();
        let hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;
        match state.storage.create_user(&username, &hash).await {
            Ok(user) => {
                tracing::info!(user = %user.id, "signed up {}", user.username);
                return Ok(Redirect::to("/login/").into_response());
            }
            Err(VerbaError::InvalidInput(_)) => {
                errors.push("A user with that username already exists.".to_string());
            }
            Err(e) => return Err(e.into()),
        }
    }

    let tmpl = SignupTemplate { username, errors };
    Ok((StatusCode::BAD_REQUEST, Html(tmpl.render()?)).into_response())
}

async fn login_form(Query(query): Query<NextQuery>) -> Result<Html<String>, AppError> {
    let tmpl = LoginTemplate {
        username: String::new(),
        next: safe_next(query.next.as_deref()).to_string(),
        error: None,
    };
    Ok(Html(tmpl.render()?))
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let username = form.username.trim().to_string();
    let next = safe_next(form.next.as_deref()).to_string();

    let user = match state.storage.find_user_by_username(&username).await? {
        Some(user) => {
            let password = form.password.clone();
            let hash = user.password_hash.clone();
            let valid =
                tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await??;
            valid.then_some(user)
        }
        None => None,
    };

    let Some(user) = user else {
        tracing::info!("failed login for {username}");
        let tmpl = LoginTemplate {
            username,
            next,
            error: Some(BAD_CREDENTIALS.to_string()),
        };
        return Ok((StatusCode::UNAUTHORIZED, Html(tmpl.render()?)).into_response());
    };

    let token = state.storage.create_login(user.id).await?;
    tracing::debug!(user = %user.id, "logged in");
    Ok((jar.add(session_cookie(token)), Redirect::to(&next)).into_response())
}

async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(token) = login_token(&jar) {
        if let Err(e) = state.storage.delete_login(token).await {
            tracing::warn!("failed to delete login: {e}");
        }
    }
    (jar.remove(expired_session_cookie()), Redirect::to("/login/")).into_response()
}
