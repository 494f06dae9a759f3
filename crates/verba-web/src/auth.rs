use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Method;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use uuid::Uuid;
use verba_core::model::User;
use verba_core::storage::StorageBackend;

use crate::error::ApiError;
use crate::AppState;

pub const SESSION_COOKIE: &str = "verba_session";

/// The logged-in user, resolved from the session cookie.
///
/// Page requests without a valid login are sent to the login form; any
/// other method gets a JSON 401.
pub struct CurrentUser(pub User);

pub enum AuthRejection {
    Login { next: String },
    Unauthorized,
    Internal,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Login { next } => Redirect::to(&login_location(&next)).into_response(),
            Self::Unauthorized => ApiError::unauthorized().into_response(),
            Self::Internal => ApiError::internal(crate::error::UNEXPECTED).into_response(),
        }
    }
}

/// The login form URL that returns to `next` afterwards.
fn login_location(next: &str) -> String {
    match serde_urlencoded::to_string([("next", next)]) {
        Ok(query) => format!("/login/?{query}"),
        Err(_) => "/login/".to_string(),
    }
}

pub fn login_token(jar: &CookieJar) -> Option<Uuid> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

pub fn session_cookie(token: Uuid) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

pub fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let reject = || {
            if parts.method == Method::GET || parts.method == Method::HEAD {
                let next = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
                AuthRejection::Login {
                    next: next.to_string(),
                }
            } else {
                AuthRejection::Unauthorized
            }
        };

        let jar = CookieJar::from_headers(&parts.headers);
        let Some(token) = login_token(&jar) else {
            return Err(reject());
        };

        match state.storage.user_for_token(token).await {
            Ok(Some(user)) => Ok(CurrentUser(user)),
            Ok(None) => Err(reject()),
            Err(e) => {
                tracing::error!("failed to resolve login: {e}");
                Err(AuthRejection::Internal)
            }
        }
    }
}
