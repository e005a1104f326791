use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use super::CrmDb;
use crate::crm::models::{format_timestamp, now_timestamp};
use crate::crm::navigation::VisibleLeads;

/// A login session and the lead-list snapshot attached to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    #[serde(skip)]
    pub visible: VisibleLeads,
    pub created_at: String,
    pub expires_at: String,
}

impl CrmDb {
    pub fn create_session(&self, user_id: i64, ttl_hours: i64) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            token: uuid::Uuid::new_v4().to_string(),
            user_id,
            visible: VisibleLeads::default(),
            created_at: format_timestamp(now),
            expires_at: format_timestamp(now + Duration::hours(ttl_hours)),
        };
        self.conn
            .execute(
                "INSERT INTO sessions (token, user_id, visible_leads, last_leads_query, created_at, expires_at)
                 VALUES (?1, ?2, '[]', '', ?3, ?4)",
                params![session.token, user_id, session.created_at, session.expires_at],
            )
            .context("Failed to insert session")?;
        Ok(session)
    }

    /// A live session; expired tokens read as absent.
    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let row: Option<(String, i64, String, String, String, String)> = self
            .conn
            .query_row(
                "SELECT token, user_id, visible_leads, last_leads_query, created_at, expires_at
                 FROM sessions WHERE token = ?1 AND expires_at > ?2",
                params![token, now_timestamp()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query session")?;
        let Some((token, user_id, ids_json, query, created_at, expires_at)) = row else {
            return Ok(None);
        };
        let ids: Vec<i64> =
            serde_json::from_str(&ids_json).context("Failed to parse visible leads")?;
        Ok(Some(Session {
            token,
            user_id,
            visible: VisibleLeads::new(ids, query),
            created_at,
            expires_at,
        }))
    }

    /// Replace the lead-list snapshot of a session.
    pub fn save_visible_leads(&self, token: &str, visible: &VisibleLeads) -> Result<()> {
        let ids_json =
            serde_json::to_string(&visible.ids).context("Failed to serialize visible leads")?;
        self.conn
            .execute(
                "UPDATE sessions SET visible_leads = ?1, last_leads_query = ?2 WHERE token = ?3",
                params![ids_json, visible.query, token],
            )
            .context("Failed to save visible leads")?;
        Ok(())
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .context("Failed to delete session")?;
        Ok(count > 0)
    }

    pub fn purge_expired_sessions(&self) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                params![now_timestamp()],
            )
            .context("Failed to purge expired sessions")
    }
}
