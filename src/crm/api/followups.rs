use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use super::{ApiError, SharedState};
use crate::crm::forms::FollowUpForm;
use crate::crm::models::FollowUp;
use crate::crm::scope::LeadScope;
use crate::crm::session::CurrentUser;
use crate::errors::{CrmError, Entity};

/// Add a note to a lead the caller can see. The caller is recorded as author.
pub async fn create_followup(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(lead_id): Path<i64>,
    Json(form): Json<FollowUpForm>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = user.viewer;
    let notes = form.cleaned();
    let followup = state
        .db
        .call(move |db| {
            if db.get_lead(viewer.lead_scope(), lead_id)?.is_none() {
                return Err(CrmError::not_found(Entity::Lead, lead_id));
            }
            Ok(db.create_followup(lead_id, Some(viewer.user_id), &notes)?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(followup)))
}

pub async fn update_followup(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(form): Json<FollowUpForm>,
) -> Result<Json<FollowUp>, ApiError> {
    let scope = user.viewer.lead_scope();
    let notes = form.cleaned();
    let followup = state
        .db
        .call(move |db| {
            let followup = db
                .get_followup(scope, id)?
                .ok_or_else(|| CrmError::not_found(Entity::FollowUp, id))?;
            db.update_followup(id, &notes)?;
            Ok(FollowUp { notes, ..followup })
        })
        .await?;
    Ok(Json(followup))
}

/// Superusers may delete any follow-up. Everyone else needs it to be in
/// their organisation and to be its author or an organisor.
pub async fn delete_followup(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let viewer = user.viewer;
    let user_id = viewer.user_id;
    state
        .db
        .call(move |db| {
            let followup = if viewer.is_superuser {
                db.get_followup_unscoped(id)?
            } else {
                match viewer.organisation() {
                    Some(org) => db.get_followup(LeadScope::Organisation(org), id)?,
                    None => None,
                }
            };
            let followup = followup.ok_or_else(|| CrmError::not_found(Entity::FollowUp, id))?;

            let is_author = followup.author_id == Some(viewer.user_id);
            if !(viewer.is_superuser || is_author || viewer.is_organisor()) {
                return Err(CrmError::Forbidden(
                    "Only the author can delete this follow-up".to_string(),
                ));
            }
            db.delete_followup(id)?;
            Ok(())
        })
        .await?;
    info!(followup_id = id, user_id, "Follow-up deleted");
    Ok(StatusCode::NO_CONTENT)
}
