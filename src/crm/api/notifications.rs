use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use super::{ApiError, SharedState};
use crate::crm::db::FEED_LIMIT;
use crate::crm::forms::MarkReadForm;
use crate::crm::models::{FeedItem, format_timestamp, now_timestamp, parse_timestamp};
use crate::crm::session::CurrentUser;
use crate::crm::ws::{self, WsMessage};

/// Unread notifications shown in the summary dropdown.
const SUMMARY_LIMIT: usize = 5;

#[derive(Serialize)]
pub struct NotificationSummary {
    pub unread_count: i64,
    pub latest: Vec<FeedItem>,
    pub assigned_lead_count: i64,
}

pub async fn summary(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<Json<NotificationSummary>, ApiError> {
    let user_id = user.viewer.user_id;
    let summary = state
        .db
        .call(move |db| {
            Ok(NotificationSummary {
                unread_count: db.unread_count(user_id)?,
                latest: db
                    .unread_notifications(user_id, SUMMARY_LIMIT)?
                    .into_iter()
                    .map(FeedItem::from)
                    .collect(),
                assigned_lead_count: db.assigned_lead_count(user_id)?,
            })
        })
        .await?;
    Ok(Json(summary))
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedParams {
    pub since: Option<String>,
}

#[derive(Serialize)]
pub struct FeedResponse {
    pub count: usize,
    pub items: Vec<FeedItem>,
    pub server_time: String,
}

/// Polling feed. With `since`, everything strictly newer (read or not);
/// without it, the newest unread.
pub async fn feed(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(params): Query<FeedParams>,
) -> Result<Json<FeedResponse>, ApiError> {
    let user_id = user.viewer.user_id;
    let since = match params.since.filter(|s| !s.trim().is_empty()) {
        Some(raw) => match parse_timestamp(&raw) {
            Some(at) => Some(format_timestamp(at)),
            None => {
                return Ok(Json(FeedResponse {
                    count: 0,
                    items: Vec::new(),
                    server_time: now_timestamp(),
                }));
            }
        },
        None => None,
    };

    // Stamped under the same lock as the read so no insert falls between.
    let (items, server_time) = state
        .db
        .call(move |db| {
            let server_time = now_timestamp();
            let items = match since {
                Some(since) => db.notifications_since(user_id, &since)?,
                None => db.unread_notifications(user_id, FEED_LIMIT)?,
            };
            Ok((items, server_time))
        })
        .await?;
    let items: Vec<FeedItem> = items.into_iter().map(FeedItem::from).collect();
    Ok(Json(FeedResponse {
        count: items.len(),
        items,
        server_time,
    }))
}

/// Flip the caller's notifications to read. Foreign ids match nothing.
pub async fn mark_read(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(form): Json<MarkReadForm>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = user.viewer.user_id;
    let MarkReadForm { ids, all } = form;
    let message = WsMessage::NotificationsRead {
        ids: ids.clone(),
        all,
    };
    let updated = state
        .db
        .call(move |db| {
            if all {
                Ok(db.mark_all_notifications_read(user_id)?)
            } else {
                Ok(db.mark_notifications_read(user_id, &ids)?)
            }
        })
        .await?;
    if updated > 0 {
        ws::publish(&state.live_tx, user_id, &message);
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}
