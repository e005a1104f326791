//! Login sessions.
//!
//! The session token travels in a cookie (or an `Authorization: Bearer`
//! header for API clients). `CurrentUser` resolves it into a `Viewer` on
//! every request.

use axum::RequestPartsExt;
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, Cookies};

use super::api::{ApiError, SharedState};
use super::db::Session;
use super::scope::Viewer;
use crate::errors::CrmError;

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub viewer: Viewer,
    pub session: Session,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = match bearer_token(&parts.headers) {
            Some(token) => Some(token),
            None => parts.extract::<Cookies>().await.ok().and_then(|cookies| {
                cookies
                    .get(&state.config.session.cookie_name)
                    .map(|c| c.value().to_string())
            }),
        };
        let token = token.ok_or(CrmError::Unauthenticated)?;

        let resolved = state
            .db
            .call(move |db| {
                let Some(session) = db.get_session(&token)? else {
                    return Ok(None);
                };
                Ok(db
                    .resolve_viewer(session.user_id)?
                    .map(|viewer| CurrentUser { viewer, session }))
            })
            .await?;
        resolved.ok_or_else(|| CrmError::Unauthenticated.into())
    }
}

pub fn session_cookie(name: &str, token: &str, ttl_hours: i64) -> Cookie<'static> {
    Cookie::build((name.to_string(), token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(ttl_hours))
        .build()
}

pub fn clear_session_cookie(cookies: &Cookies, name: &str) {
    cookies.remove(Cookie::build((name.to_string(), "")).path("/").build());
}
