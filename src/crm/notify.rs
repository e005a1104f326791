//! Side effects that follow a committed write: in-app notifications, live
//! push and email. All of them are best effort. A failure is logged and the
//! triggering request still succeeds.

use tracing::{info, warn};

use super::api::AppState;
use super::api::leads::{lead_location, list_location};
use super::mailer::{self, OutboundMail};
use super::models::{FeedItem, Lead};
use super::ws::{self, WsMessage};

/// How many lead names a bulk-assignment message lists.
const BULK_NAME_SAMPLE: usize = 3;

pub fn lead_created_message(lead: &Lead) -> (String, String) {
    (
        format!("New lead: {} {}", lead.first_name, lead.last_name),
        lead_location(lead.id),
    )
}

/// `names` are first names of the assigned leads in id order; only the first
/// three are shown.
pub fn bulk_assign_message(count: usize, names: &[String]) -> String {
    let shown: Vec<&str> = names
        .iter()
        .take(BULK_NAME_SAMPLE)
        .map(String::as_str)
        .collect();
    let extra = if count > BULK_NAME_SAMPLE {
        format!(" +{} të tjerë", count - BULK_NAME_SAMPLE)
    } else {
        String::new()
    };
    format!("U caktuan {} leads tek ju: {}{}", count, shown.join(", "), extra)
}

/// Store a notification for `user_id` and push it to their open sockets.
pub async fn notify(state: &AppState, user_id: i64, message: String, url: Option<String>) {
    let result = state
        .db
        .call(move |db| Ok(db.create_notification(user_id, &message, url.as_deref())?))
        .await;
    match result {
        Ok(notification) => {
            ws::publish(
                &state.live_tx,
                user_id,
                &WsMessage::NotificationCreated {
                    notification: FeedItem::from(notification),
                },
            );
        }
        Err(e) => warn!(user_id, error = %e, "Failed to create notification"),
    }
}

/// Send mail on the blocking pool, logging failures.
pub async fn send_mail(state: &AppState, mail: OutboundMail) {
    let mailer = state.mailer.clone();
    let to = mail.to.clone();
    match tokio::task::spawn_blocking(move || mailer.send(&mail)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(to = %to, error = %e, "Failed to send email"),
        Err(e) => warn!(to = %to, error = %e, "Mail task panicked"),
    }
}

/// Tell the organisation owner about a new lead and mail the configured
/// recipient.
pub async fn lead_created(state: &AppState, lead: &Lead) {
    let organisation_id = lead.organisation_id;
    let owner = state
        .db
        .call(move |db| Ok(db.organisation_owner(organisation_id)?))
        .await;
    match owner {
        Ok(Some(owner)) => {
            let (message, url) = lead_created_message(lead);
            notify(state, owner.id, message, Some(url)).await;
        }
        Ok(None) => warn!(organisation_id, "Organisation has no owner to notify"),
        Err(e) => warn!(organisation_id, error = %e, "Failed to look up organisation owner"),
    }

    let recipient = state.config.mail.lead_created_recipient.clone();
    send_mail(state, mailer::lead_created(&recipient, &lead.full_name())).await;
    info!(lead_id = lead.id, organisation_id, "Lead created");
}

/// Tell an agent's user about leads assigned to them in bulk.
pub async fn leads_assigned(state: &AppState, user_id: i64, count: usize, names: &[String]) {
    if count == 0 {
        return;
    }
    notify(
        state,
        user_id,
        bulk_assign_message(count, names),
        Some(list_location("")),
    )
    .await;
}
