use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::{ApiError, SharedState};
use crate::crm::forms::CategoryForm;
use crate::crm::models::{Category, CategoryDetail, CategoryListing};
use crate::crm::session::CurrentUser;
use crate::errors::{CrmError, Entity};

/// Categories of the caller's organisation with the count of leads that
/// have no category yet.
pub async fn list_categories(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<Json<CategoryListing>, ApiError> {
    let org = user.viewer.organisation();
    let listing = state
        .db
        .call(move |db| match org {
            Some(org) => Ok(db.category_listing(org)?),
            None => Ok(CategoryListing {
                categories: Vec::new(),
                unassigned_lead_count: 0,
            }),
        })
        .await?;
    Ok(Json(listing))
}

/// A category with the leads of it the caller may see.
pub async fn get_category(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<CategoryDetail>, ApiError> {
    let scope = user.viewer.lead_scope();
    let detail = state
        .db
        .call(move |db| {
            db.category_detail(scope, id)?
                .ok_or_else(|| CrmError::not_found(Entity::Category, id))
        })
        .await?;
    Ok(Json(detail))
}

pub async fn create_category(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(form): Json<CategoryForm>,
) -> Result<impl IntoResponse, ApiError> {
    let org = user.viewer.require_organisor()?;
    let name = form.validate()?;
    let category = state
        .db
        .call(move |db| Ok(db.create_category(org, &name)?))
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(form): Json<CategoryForm>,
) -> Result<Json<Category>, ApiError> {
    let org = user.viewer.require_organisor()?;
    let name = form.validate()?;
    let category = state
        .db
        .call(move |db| {
            db.rename_category(org, id, &name)?
                .ok_or_else(|| CrmError::not_found(Entity::Category, id))
        })
        .await?;
    Ok(Json(category))
}

pub async fn delete_category(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let org = user.viewer.require_organisor()?;
    let deleted = state
        .db
        .call(move |db| Ok(db.delete_category(org, id)?))
        .await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(CrmError::not_found(Entity::Category, id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::crm::testutil;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_listing_counts_uncategorised_leads() {
        let app = TestApp::new();
        let (_, org, token) = app.organisor("owner");
        let (_, agent_token) = app.agent(org, "ana");
        app.db(|db| db.create_category(org, "Contacted"));
        app.db(|db| testutil::lead(db, org, "Arta", None));
        app.db(|db| testutil::lead(db, org, "Besa", None));

        let body = body_json(app.get("/api/categories", Some(&token)).await).await;
        assert_eq!(body["categories"].as_array().unwrap().len(), 1);
        assert_eq!(body["unassigned_lead_count"], 2);

        let body = body_json(app.get("/api/categories", Some(&agent_token)).await).await;
        assert_eq!(body["categories"][0]["name"], "Contacted");
    }

    #[tokio::test]
    async fn test_detail_lists_only_visible_leads() {
        let app = TestApp::new();
        let (_, org, token) = app.organisor("owner");
        let (ana, ana_token) = app.agent(org, "ana");
        let category = app.db(|db| db.create_category(org, "Contacted"));
        for (name, agent) in [("Arta", Some(ana.id)), ("Besa", None)] {
            app.db(|db| {
                db.create_lead(org, &testutil::lead_fields(name, agent), Some(category.id))
            });
        }

        let uri = format!("/api/categories/{}", category.id);
        let body = body_json(app.get(&uri, Some(&token)).await).await;
        assert_eq!(body["leads"].as_array().unwrap().len(), 2);

        let body = body_json(app.get(&uri, Some(&ana_token)).await).await;
        let leads = body["leads"].as_array().unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0]["first_name"], "Arta");
    }

    #[tokio::test]
    async fn test_crud_for_organisors_only() {
        let app = TestApp::new();
        let (_, org, token) = app.organisor("owner");
        let (_, agent_token) = app.agent(org, "ana");

        let response = app
            .post("/api/categories", Some(&agent_token), json!({"name": "Hot"}))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .post("/api/categories", Some(&token), json!({"name": "  "}))
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = app
            .post("/api/categories", Some(&token), json!({"name": "Hot"}))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["id"].as_i64().unwrap();

        let response = app
            .put(
                &format!("/api/categories/{}", id),
                Some(&token),
                json!({"name": "Warm"}),
            )
            .await;
        assert_eq!(body_json(response).await["name"], "Warm");

        let response = app
            .delete(&format!("/api/categories/{}", id), Some(&token))
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = app
            .get(&format!("/api/categories/{}", id), Some(&token))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/api/categories");
    }

    #[tokio::test]
    async fn test_foreign_category_is_not_editable() {
        let app = TestApp::new();
        let (_, _, token) = app.organisor("owner");
        let (_, other_org, _) = app.organisor("other");
        let foreign = app.db(|db| db.create_category(other_org, "Theirs"));

        let response = app
            .put(
                &format!("/api/categories/{}", foreign.id),
                Some(&token),
                json!({"name": "Mine"}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let kept = app.db(|db| db.get_category(other_org, foreign.id));
        assert_eq!(kept.unwrap().name, "Theirs");
    }
}
