//! Unauthenticated lead intake.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::{ApiError, SharedState};
use crate::crm::forms::PublicLeadForm;
use crate::crm::models::INTAKE_CATEGORY;
use crate::crm::notify;
use crate::errors::CrmError;

const THANK_YOU_ROUTE: &str = "/api/public/thank-you";

#[derive(Serialize)]
struct FieldDescriptor {
    name: &'static str,
    label: &'static str,
    required: bool,
}

const fn field(name: &'static str, label: &'static str, required: bool) -> FieldDescriptor {
    FieldDescriptor {
        name,
        label,
        required,
    }
}

pub async fn intake_form() -> impl IntoResponse {
    Json(json!({
        "action": "/api/public/leads",
        "fields": [
            field("first_name", "First name", true),
            field("last_name", "Last name", true),
            field("email", "Email", true),
            field("phone_number", "Phone number", false),
            field("age", "Age", false),
            field("service", "Service", false),
            field("source", "Source", false),
        ],
    }))
}

/// File the lead under the intake owner's organisation, on the owner's own
/// agent record and in the `New` category.
pub async fn submit_lead(
    State(state): State<SharedState>,
    Json(form): Json<PublicLeadForm>,
) -> Result<impl IntoResponse, ApiError> {
    let mut fields = form.validate()?;
    let owner_username = state.config.intake.owner_username.clone();
    let lead = state
        .db
        .call(move |db| {
            let owner = db.find_user_by_username(&owner_username)?.ok_or_else(|| {
                CrmError::Config(format!("intake owner '{}' does not exist", owner_username))
            })?;
            let organisation = db.organisation_for_user(owner.id)?.ok_or_else(|| {
                CrmError::Config(format!("intake owner '{}' has no organisation", owner_username))
            })?;
            let agent = match db.find_agent_by_user(owner.id)? {
                Some(agent) => agent,
                None => db.create_agent(owner.id, organisation.id)?,
            };
            let category = db.find_or_create_category(organisation.id, INTAKE_CATEGORY)?;
            fields.agent_id = Some(agent.id);
            Ok(db.create_lead(organisation.id, &fields, Some(category.id))?)
        })
        .await?;

    info!(lead_id = lead.id, source = ?form.source, "Lead received from intake form");
    notify::lead_created(&state, &lead).await;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "lead": lead, "redirect": THANK_YOU_ROUTE })),
    ))
}

pub async fn thank_you() -> impl IntoResponse {
    Json(json!({ "message": "Thank you! We will get in touch with you soon." }))
}
