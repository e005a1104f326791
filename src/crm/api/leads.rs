use axum::{
    Json,
    extract::{Path, Query, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, SharedState, see_other};
use crate::crm::db::CrmDb;
use crate::crm::forms::{AssignAgentForm, BulkAssignForm, CategoryChangeForm, LeadForm};
use crate::crm::models::*;
use crate::crm::navigation::VisibleLeads;
use crate::crm::notify;
use crate::crm::scope::LeadScope;
use crate::crm::session::CurrentUser;
use crate::errors::{CrmError, Entity};

const DEFAULT_PER_PAGE: usize = 10;
const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";

// ── List parameters & pagination ──────────────────────────────────────

/// Raw list query. Values arrive as strings from filter widgets, so
/// anything unparseable is ignored rather than rejected.
#[derive(Debug, Default, Deserialize)]
pub struct LeadListParams {
    pub q: Option<String>,
    pub agent: Option<String>,
    pub category: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub perpage: Option<String>,
}

impl LeadListParams {
    fn filter(&self) -> LeadFilter {
        LeadFilter {
            q: self.q.clone().filter(|q| !q.trim().is_empty()),
            agent_id: self.agent.as_deref().and_then(|v| v.trim().parse().ok()),
            category_id: self.category.as_deref().and_then(|v| v.trim().parse().ok()),
            sort: self.sort.as_deref().and_then(|v| v.parse().ok()),
        }
    }

    /// Page size: digits only, anything else (or zero) falls back to the
    /// default.
    fn per_page(&self) -> usize {
        self.perpage
            .as_deref()
            .filter(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()))
            .and_then(|v| v.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_PER_PAGE)
    }

    fn page(&self) -> usize {
        self.page
            .as_deref()
            .and_then(|v| v.trim().parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(1)
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PageInfo {
    pub number: usize,
    pub per_page: usize,
    pub total: usize,
    pub num_pages: usize,
}

/// Slice one page out of `items`. Pages past the end clamp to the last one.
fn paginate<T>(items: Vec<T>, page: usize, per_page: usize) -> (Vec<T>, PageInfo) {
    let total = items.len();
    let num_pages = total.div_ceil(per_page).max(1);
    let number = page.clamp(1, num_pages);
    let slice = items
        .into_iter()
        .skip((number - 1) * per_page)
        .take(per_page)
        .collect();
    (
        slice,
        PageInfo {
            number,
            per_page,
            total,
            num_pages,
        },
    )
}

#[derive(Serialize)]
pub struct LeadListResponse {
    pub leads: Vec<Lead>,
    pub page: PageInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unassigned_leads: Option<Vec<Lead>>,
    pub agents: Vec<Agent>,
    pub categories: Vec<Category>,
    pub unread_count: i64,
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Reject an agent id that is not part of `organisation_id`.
fn check_agent(
    db: &CrmDb,
    organisation_id: i64,
    agent_id: Option<i64>,
    field: &str,
    message: &str,
) -> Result<(), CrmError> {
    if let Some(agent_id) = agent_id {
        if db.get_agent(organisation_id, agent_id)?.is_none() {
            return Err(CrmError::invalid(field, message));
        }
    }
    Ok(())
}

pub(crate) fn lead_location(id: i64) -> String {
    format!("/api/leads/{}", id)
}

pub(crate) fn list_location(query: &str) -> String {
    if query.is_empty() {
        "/api/leads".to_string()
    } else {
        format!("/api/leads?{}", query)
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

/// Scoped, filtered list. Also records the full id sequence in the session
/// for next/previous navigation.
pub async fn list_leads(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(params): Query<LeadListParams>,
    RawQuery(raw_query): RawQuery,
) -> Result<Json<LeadListResponse>, ApiError> {
    let viewer = user.viewer;
    let token = user.session.token;
    let filter = params.filter();
    let (page, per_page) = (params.page(), params.per_page());

    let response = state
        .db
        .call(move |db| {
            let leads = db.list_leads(viewer.lead_scope(), &filter)?;
            let visible = VisibleLeads::new(
                leads.iter().map(|l| l.id).collect(),
                raw_query.unwrap_or_default(),
            );
            db.save_visible_leads(&token, &visible)?;

            let (agents, categories, unassigned_leads) = match viewer.organisation() {
                Some(org) => (
                    db.list_agents(org)?,
                    db.list_categories(org)?,
                    if viewer.is_organisor() {
                        Some(db.unassigned_leads(org)?)
                    } else {
                        None
                    },
                ),
                None => (Vec::new(), Vec::new(), None),
            };
            let (leads, page) = paginate(leads, page, per_page);
            Ok(LeadListResponse {
                leads,
                page,
                unassigned_leads,
                agents,
                categories,
                unread_count: db.unread_count(viewer.user_id)?,
            })
        })
        .await?;
    Ok(Json(response))
}

pub async fn create_lead(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(form): Json<LeadForm>,
) -> Result<impl IntoResponse, ApiError> {
    let org = user.viewer.require_organisor()?;
    let fields = form.validate()?;
    let lead = state
        .db
        .call(move |db| {
            check_agent(db, org, fields.agent_id, "agent", INVALID_CHOICE)?;
            Ok(db.create_lead(org, &fields, None)?)
        })
        .await?;

    notify::lead_created(&state, &lead).await;
    Ok((StatusCode::CREATED, Json(lead)))
}

pub async fn get_lead(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<LeadDetail>, ApiError> {
    let scope = user.viewer.lead_scope();
    let detail = state
        .db
        .call(move |db| {
            db.lead_detail(scope, id)?
                .ok_or_else(|| CrmError::not_found(Entity::Lead, id))
        })
        .await?;
    Ok(Json(detail))
}

pub async fn update_lead(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(form): Json<LeadForm>,
) -> Result<Json<Lead>, ApiError> {
    let org = user.viewer.require_organisor()?;
    let fields = form.validate()?;
    let lead = state
        .db
        .call(move |db| {
            if db.get_lead(LeadScope::Organisation(org), id)?.is_none() {
                return Err(CrmError::not_found(Entity::Lead, id));
            }
            check_agent(db, org, fields.agent_id, "agent", INVALID_CHOICE)?;
            db.update_lead(org, id, &fields)?
                .ok_or_else(|| CrmError::not_found(Entity::Lead, id))
        })
        .await?;
    Ok(Json(lead))
}

pub async fn delete_lead(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let org = user.viewer.require_organisor()?;
    let deleted = state
        .db
        .call(move |db| Ok(db.delete_lead(org, id)?))
        .await?;
    if !deleted {
        return Err(CrmError::not_found(Entity::Lead, id).into());
    }
    info!(lead_id = id, organisation_id = org, "Lead deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Redirect to the lead after `id` in the last rendered list, or back to the
/// list when `id` is not part of it.
pub async fn next_lead(user: CurrentUser, Path(id): Path<i64>) -> Response {
    navigate(&user.session.visible, user.session.visible.next(id))
}

pub async fn previous_lead(user: CurrentUser, Path(id): Path<i64>) -> Response {
    navigate(&user.session.visible, user.session.visible.previous(id))
}

fn navigate(visible: &VisibleLeads, target: Option<i64>) -> Response {
    match target {
        Some(id) => see_other(&lead_location(id)),
        None => see_other(&list_location(&visible.query)),
    }
}

pub async fn assign_agent(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(form): Json<AssignAgentForm>,
) -> Result<Json<Lead>, ApiError> {
    let org = user.viewer.require_organisor()?;
    let agent_id = form.validate()?;
    let lead = state
        .db
        .call(move |db| {
            if db.get_lead(LeadScope::Organisation(org), id)?.is_none() {
                return Err(CrmError::not_found(Entity::Lead, id));
            }
            check_agent(db, org, Some(agent_id), "agent", INVALID_CHOICE)?;
            db.assign_lead(org, id, agent_id)?
                .ok_or_else(|| CrmError::not_found(Entity::Lead, id))
        })
        .await?;
    Ok(Json(lead))
}

/// Move a lead between categories. Stamps the conversion date on entering
/// the organisation's `Converted` category.
pub async fn change_category(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(form): Json<CategoryChangeForm>,
) -> Result<Json<Lead>, ApiError> {
    let scope = user.viewer.lead_scope();
    let lead = state
        .db
        .call(move |db| {
            let lead = db
                .get_lead(scope, id)?
                .ok_or_else(|| CrmError::not_found(Entity::Lead, id))?;
            if let Some(category_id) = form.category {
                if db.get_category(lead.organisation_id, category_id)?.is_none() {
                    return Err(CrmError::invalid("category", INVALID_CHOICE));
                }
            }
            db.change_category(scope, id, form.category)?
                .ok_or_else(|| CrmError::not_found(Entity::Lead, id))
        })
        .await?;
    Ok(Json(lead))
}

#[derive(Serialize)]
pub struct BulkAssignCandidates {
    pub leads: Vec<Lead>,
    pub agents: Vec<Agent>,
}

pub async fn bulk_assign_candidates(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<Json<BulkAssignCandidates>, ApiError> {
    let org = user.viewer.require_organisor()?;
    let candidates = state
        .db
        .call(move |db| {
            Ok(BulkAssignCandidates {
                leads: db.unassigned_leads(org)?,
                agents: db.list_agents(org)?,
            })
        })
        .await?;
    Ok(Json(candidates))
}

#[derive(Debug, Serialize)]
pub struct BulkAssignResult {
    pub updated: usize,
    pub agent_id: i64,
}

/// Assign many leads at once and tell the agent about it.
pub async fn bulk_assign(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(form): Json<BulkAssignForm>,
) -> Result<Json<BulkAssignResult>, ApiError> {
    let org = user.viewer.require_organisor()?;
    let (lead_ids, agent_id) = form.validate()?;
    let (agent, updated, names) = state
        .db
        .call(move |db| {
            let agent = db
                .get_agent(org, agent_id)?
                .ok_or_else(|| CrmError::invalid("agent_id", "Agjenti i zgjedhur nuk ekziston."))?;
            let (updated, names) = db.bulk_assign(org, &lead_ids, agent.id)?;
            Ok((agent, updated, names))
        })
        .await?;

    info!(agent_id, updated, organisation_id = org, "Leads bulk assigned");
    notify::leads_assigned(&state, agent.user.id, updated, &names).await;
    Ok(Json(BulkAssignResult { updated, agent_id }))
}
