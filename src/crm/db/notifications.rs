use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Row, params, params_from_iter};

use super::{CrmDb, collect_rows, id_chunks, placeholders};
use crate::crm::models::*;

/// Most items a single feed response carries.
pub const FEED_LIMIT: usize = 10;

const NOTIFICATION_COLUMNS: &str = "id, user_id, message, url, read, created_at";

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        message: row.get(2)?,
        url: row.get(3)?,
        read: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl CrmDb {
    pub fn create_notification(
        &self,
        user_id: i64,
        message: &str,
        url: Option<&str>,
    ) -> Result<Notification> {
        self.insert_notification_at(user_id, message, url, &now_timestamp())
    }

    /// Insert with an explicit `created_at` (fixed timestamp format).
    pub fn insert_notification_at(
        &self,
        user_id: i64,
        message: &str,
        url: Option<&str>,
        created_at: &str,
    ) -> Result<Notification> {
        self.conn
            .execute(
                "INSERT INTO notifications (user_id, message, url, read, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                params![user_id, message, url, created_at],
            )
            .context("Failed to insert notification")?;
        Ok(Notification {
            id: self.conn.last_insert_rowid(),
            user_id,
            message: message.to_string(),
            url: url.map(str::to_string),
            read: false,
            created_at: created_at.to_string(),
        })
    }

    fn query_notifications(&self, sql: &str, values: Vec<Value>) -> Result<Vec<Notification>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .context("Failed to prepare notification query")?;
        let rows = stmt
            .query_map(params_from_iter(values), notification_from_row)
            .context("Failed to query notifications")?;
        collect_rows(rows, "notification")
    }

    /// Notifications created strictly after `since`, newest first.
    pub fn notifications_since(&self, user_id: i64, since: &str) -> Result<Vec<Notification>> {
        self.query_notifications(
            &format!(
                "SELECT {} FROM notifications WHERE user_id = ? AND created_at > ?
                 ORDER BY created_at DESC, id DESC LIMIT {}",
                NOTIFICATION_COLUMNS, FEED_LIMIT
            ),
            vec![Value::Integer(user_id), Value::Text(since.to_string())],
        )
    }

    /// Newest unread notifications, at most `limit`.
    pub fn unread_notifications(&self, user_id: i64, limit: usize) -> Result<Vec<Notification>> {
        self.query_notifications(
            &format!(
                "SELECT {} FROM notifications WHERE user_id = ? AND read = 0
                 ORDER BY created_at DESC, id DESC LIMIT ?",
                NOTIFICATION_COLUMNS
            ),
            vec![Value::Integer(user_id), Value::Integer(limit as i64)],
        )
    }

    pub fn unread_count(&self, user_id: i64) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
                params![user_id],
                |row| row.get(0),
            )
            .context("Failed to count unread notifications")
    }

    /// Flag the listed notifications of `user_id` as read. Ids belonging to
    /// other users are ignored.
    pub fn mark_notifications_read(&self, user_id: i64, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let mut updated = 0;
        for chunk in id_chunks(ids) {
            let mut values = vec![Value::Integer(user_id)];
            values.extend(chunk.iter().map(|&id| Value::Integer(id)));
            updated += tx
                .execute(
                    &format!(
                        "UPDATE notifications SET read = 1 WHERE user_id = ? AND id IN ({})",
                        placeholders(chunk.len())
                    ),
                    params_from_iter(values),
                )
                .context("Failed to mark notifications read")?;
        }
        tx.commit().context("Failed to commit notification reads")?;
        Ok(updated)
    }

    pub fn mark_all_notifications_read(&self, user_id: i64) -> Result<usize> {
        self.conn
            .execute(
                "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
                params![user_id],
            )
            .context("Failed to mark all notifications read")
    }
}
