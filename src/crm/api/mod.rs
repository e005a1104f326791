//! JSON HTTP API.
//!
//! Handlers resolve the caller with `CurrentUser`, run their queries through
//! `DbHandle::call`, and fire notifications only after the write returned.

mod agents;
mod auth;
mod categories;
mod followups;
pub(crate) mod leads;
mod notifications;
mod public;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use tokio::sync::broadcast;
use tracing::error;

use super::db::DbHandle;
use super::mailer::Mailer;
use super::ws::{self, LiveEvent};
use crate::config::CrmConfig;
use crate::errors::{CrmError, Entity, FieldErrors};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub live_tx: broadcast::Sender<LiveEvent>,
    pub mailer: Arc<dyn Mailer>,
    pub config: CrmConfig,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(db: DbHandle, mailer: Arc<dyn Mailer>, config: CrmConfig) -> Self {
        let (live_tx, _) = broadcast::channel(ws::CHANNEL_CAPACITY);
        Self {
            db,
            live_tx,
            mailer,
            config,
        }
    }
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    Validation(FieldErrors),
    Forbidden(String),
    /// Missing or out of scope; answered with a redirect to `location`.
    NotFound { location: String, message: String },
    Unauthenticated,
    Internal(String),
}

/// List route a missing entity redirects to.
fn list_route(entity: Entity) -> &'static str {
    match entity {
        Entity::Lead | Entity::FollowUp => "/api/leads",
        Entity::Agent => "/api/agents",
        Entity::Category => "/api/categories",
        Entity::Notification => "/api/notifications",
        Entity::User => "/api/me",
    }
}

impl From<CrmError> for ApiError {
    fn from(e: CrmError) -> Self {
        if let CrmError::NotFound { entity, .. } = &e {
            return Self::NotFound {
                location: list_route(*entity).to_string(),
                message: e.to_string(),
            };
        }
        match e {
            CrmError::Validation(errors) => Self::Validation(errors),
            CrmError::Forbidden(msg) => Self::Forbidden(msg),
            CrmError::Unauthenticated => Self::Unauthenticated,
            other => Self::Internal(format!("{:#}", other)),
        }
    }
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({ "errors": errors })),
            )
                .into_response(),
            ApiError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": msg })),
            )
                .into_response(),
            ApiError::NotFound { location, message } => see_other_with(
                &location,
                Json(serde_json::json!({ "error": message, "redirect": location })),
            ),
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "Authentication required" })),
            )
                .into_response(),
            ApiError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

/// `303 See Other` to `location`.
pub(crate) fn see_other(location: &str) -> Response {
    see_other_with(
        location,
        Json(serde_json::json!({ "redirect": location })),
    )
}

fn see_other_with(location: &str, body: impl IntoResponse) -> Response {
    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, location.to_string())],
        body,
    )
        .into_response()
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/signup", post(auth::signup))
        .route("/api/login", post(auth::login))
        .route("/api/logout", post(auth::logout))
        .route("/api/me", get(auth::me))
        .route("/api/dashboard", get(auth::dashboard))
        .route("/api/leads", get(leads::list_leads).post(leads::create_lead))
        .route(
            "/api/leads/bulk-assign",
            get(leads::bulk_assign_candidates).post(leads::bulk_assign),
        )
        .route(
            "/api/leads/{id}",
            get(leads::get_lead)
                .put(leads::update_lead)
                .delete(leads::delete_lead),
        )
        .route("/api/leads/{id}/next", get(leads::next_lead))
        .route("/api/leads/{id}/previous", get(leads::previous_lead))
        .route("/api/leads/{id}/assign", put(leads::assign_agent))
        .route("/api/leads/{id}/category", put(leads::change_category))
        .route("/api/leads/{id}/followups", post(followups::create_followup))
        .route(
            "/api/followups/{id}",
            put(followups::update_followup).delete(followups::delete_followup),
        )
        .route("/api/agents", get(agents::list_agents).post(agents::create_agent))
        .route(
            "/api/agents/{id}",
            get(agents::get_agent)
                .put(agents::update_agent)
                .delete(agents::delete_agent),
        )
        .route(
            "/api/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/api/categories/{id}",
            get(categories::get_category)
                .put(categories::update_category)
                .delete(categories::delete_category),
        )
        .route(
            "/api/public/leads",
            get(public::intake_form).post(public::submit_lead),
        )
        .route("/api/public/thank-you", get(public::thank_you))
        .route("/api/notifications", get(notifications::summary))
        .route("/api/notifications/feed", get(notifications::feed))
        .route("/api/notifications/mark-read", post(notifications::mark_read))
}

async fn health_check() -> &'static str {
    "ok"
}
