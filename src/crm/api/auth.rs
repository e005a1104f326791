use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tower_cookies::Cookies;
use tracing::info;

use super::{ApiError, SharedState};
use crate::crm::forms::{AccountForm, LoginForm};
use crate::crm::models::User;
use crate::crm::scope::{Role, Viewer};
use crate::crm::session::{CurrentUser, clear_session_cookie, session_cookie};
use crate::errors::{CrmError, Entity, FieldErrors};

#[derive(Serialize)]
pub struct MeResponse {
    pub user: User,
    pub role: Role,
    pub organisation_id: Option<i64>,
    pub agent_id: Option<i64>,
}

impl MeResponse {
    fn new(user: User, viewer: &Viewer) -> Self {
        Self {
            user,
            role: viewer.role,
            organisation_id: viewer.organisation(),
            agent_id: viewer.agent_id,
        }
    }
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: String,
    #[serde(flatten)]
    pub me: MeResponse,
}

/// Register an organisor account; the account owns a fresh organisation.
pub async fn signup(
    State(state): State<SharedState>,
    Json(form): Json<AccountForm>,
) -> Result<impl IntoResponse, ApiError> {
    let fields = form.validate(true)?;
    let user = state
        .db
        .call(move |db| {
            if db.username_taken(&fields.username, None)? {
                return Err(CrmError::invalid(
                    "username",
                    "A user with that username already exists.",
                ));
            }
            Ok(db.create_user(&fields, true, false, false)?)
        })
        .await?;
    info!(user_id = user.id, username = %user.username, "Organisor signed up");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<SharedState>,
    cookies: Cookies,
    Json(form): Json<LoginForm>,
) -> Result<impl IntoResponse, ApiError> {
    let ttl_hours = state.config.session.ttl_hours;
    let (session, me) = state
        .db
        .call(move |db| {
            let user = db
                .verify_credentials(form.username.trim(), &form.password)?
                .ok_or_else(|| {
                    CrmError::Validation(FieldErrors::single(
                        FieldErrors::NON_FIELD,
                        "Please enter a correct username and password.",
                    ))
                })?;
            let viewer = db
                .resolve_viewer(user.id)?
                .ok_or_else(|| CrmError::not_found(Entity::User, user.id))?;
            let session = db.create_session(user.id, ttl_hours)?;
            Ok((session, MeResponse::new(user, &viewer)))
        })
        .await?;

    cookies.add(session_cookie(
        &state.config.session.cookie_name,
        &session.token,
        ttl_hours,
    ));
    info!(user_id = me.user.id, "User logged in");
    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        me,
    }))
}

pub async fn logout(
    State(state): State<SharedState>,
    cookies: Cookies,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let token = user.session.token.clone();
    state
        .db
        .call(move |db| Ok(db.delete_session(&token)?))
        .await?;
    clear_session_cookie(&cookies, &state.config.session.cookie_name);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = user.viewer;
    let me = state
        .db
        .call(move |db| {
            let user = db
                .get_user(viewer.user_id)?
                .ok_or_else(|| CrmError::not_found(Entity::User, viewer.user_id))?;
            Ok(MeResponse::new(user, &viewer))
        })
        .await?;
    Ok(Json(me))
}

/// Lead totals for the organisor's organisation.
pub async fn dashboard(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let org = user.viewer.require_organisor()?;
    let stats = state
        .db
        .call(move |db| Ok(db.dashboard_stats(org)?))
        .await?;
    Ok(Json(stats))
}
