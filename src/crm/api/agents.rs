use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use super::{ApiError, SharedState};
use crate::crm::forms::AccountForm;
use crate::crm::mailer;
use crate::crm::models::Agent;
use crate::crm::notify;
use crate::crm::session::CurrentUser;
use crate::errors::{CrmError, Entity};

const USERNAME_TAKEN: &str = "A user with that username already exists.";

pub async fn list_agents(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<Json<Vec<Agent>>, ApiError> {
    let org = user.viewer.require_organisor()?;
    let agents = state
        .db
        .call(move |db| Ok(db.list_agents(org)?))
        .await?;
    Ok(Json(agents))
}

/// Create the agent's user account and the agent record, then mail the
/// invitation.
pub async fn create_agent(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(form): Json<AccountForm>,
) -> Result<impl IntoResponse, ApiError> {
    let org = user.viewer.require_organisor()?;
    let fields = form.validate(true)?;
    let agent = state
        .db
        .call(move |db| {
            if db.username_taken(&fields.username, None)? {
                return Err(CrmError::invalid("username", USERNAME_TAKEN));
            }
            let account = db.create_user(&fields, false, true, false)?;
            Ok(db.create_agent(account.id, org)?)
        })
        .await?;

    info!(agent_id = agent.id, organisation_id = org, "Agent created");
    notify::send_mail(
        &state,
        mailer::agent_invitation(&agent.user.email, &agent.user.username),
    )
    .await;
    Ok((StatusCode::CREATED, Json(agent)))
}

pub async fn get_agent(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Agent>, ApiError> {
    let org = user.viewer.require_organisor()?;
    let agent = state
        .db
        .call(move |db| {
            db.get_agent(org, id)?
                .ok_or_else(|| CrmError::not_found(Entity::Agent, id))
        })
        .await?;
    Ok(Json(agent))
}

/// Edit the agent's account. An empty password pair keeps the old password.
pub async fn update_agent(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(form): Json<AccountForm>,
) -> Result<Json<Agent>, ApiError> {
    let org = user.viewer.require_organisor()?;
    let fields = form.validate(false)?;
    let agent = state
        .db
        .call(move |db| {
            let agent = db
                .get_agent(org, id)?
                .ok_or_else(|| CrmError::not_found(Entity::Agent, id))?;
            if db.username_taken(&fields.username, Some(agent.user.id))? {
                return Err(CrmError::invalid("username", USERNAME_TAKEN));
            }
            let user = db.update_user(agent.user.id, &fields)?;
            Ok(Agent { user, ..agent })
        })
        .await?;
    Ok(Json(agent))
}

pub async fn delete_agent(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let org = user.viewer.require_organisor()?;
    let deleted = state
        .db
        .call(move |db| Ok(db.delete_agent(org, id)?))
        .await?;
    if !deleted {
        return Err(CrmError::not_found(Entity::Agent, id).into());
    }
    info!(agent_id = id, organisation_id = org, "Agent deleted");
    Ok(StatusCode::NO_CONTENT)
}
