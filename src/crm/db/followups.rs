use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

use super::{CrmDb, collect_rows};
use crate::crm::models::*;
use crate::crm::scope::LeadScope;

fn followup_from_row(row: &Row<'_>) -> rusqlite::Result<FollowUp> {
    Ok(FollowUp {
        id: row.get(0)?,
        lead_id: row.get(1)?,
        author_id: row.get(2)?,
        notes: row.get(3)?,
        date_added: row.get(4)?,
    })
}

impl CrmDb {
    pub fn create_followup(
        &self,
        lead_id: i64,
        author_id: Option<i64>,
        notes: &str,
    ) -> Result<FollowUp> {
        let date_added = now_timestamp();
        self.conn
            .execute(
                "INSERT INTO followups (lead_id, author_id, notes, date_added)
                 VALUES (?1, ?2, ?3, ?4)",
                params![lead_id, author_id, notes, date_added],
            )
            .context("Failed to insert follow-up")?;
        Ok(FollowUp {
            id: self.conn.last_insert_rowid(),
            lead_id,
            author_id,
            notes: notes.to_string(),
            date_added,
        })
    }

    /// Notes of a lead, newest first.
    pub fn list_followups(&self, lead_id: i64) -> Result<Vec<FollowUp>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, lead_id, author_id, notes, date_added FROM followups
                 WHERE lead_id = ?1 ORDER BY date_added DESC, id DESC",
            )
            .context("Failed to prepare list_followups")?;
        let rows = stmt
            .query_map(params![lead_id], followup_from_row)
            .context("Failed to query follow-ups")?;
        collect_rows(rows, "follow-up")
    }

    /// A follow-up whose lead is visible under `scope`.
    pub fn get_followup(&self, scope: LeadScope, id: i64) -> Result<Option<FollowUp>> {
        let (clause, mut values) = scope.sql();
        values.push(Value::Integer(id));
        self.conn
            .query_row(
                &format!(
                    "SELECT f.id, f.lead_id, f.author_id, f.notes, f.date_added
                     FROM followups f JOIN leads l ON l.id = f.lead_id
                     WHERE {} AND f.id = ?",
                    clause
                ),
                params_from_iter(values),
                followup_from_row,
            )
            .optional()
            .context("Failed to query follow-up")
    }

    /// Unscoped lookup, for superusers.
    pub fn get_followup_unscoped(&self, id: i64) -> Result<Option<FollowUp>> {
        self.conn
            .query_row(
                "SELECT id, lead_id, author_id, notes, date_added FROM followups WHERE id = ?1",
                params![id],
                followup_from_row,
            )
            .optional()
            .context("Failed to query follow-up")
    }

    pub fn update_followup(&self, id: i64, notes: &str) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "UPDATE followups SET notes = ?1 WHERE id = ?2",
                params![notes, id],
            )
            .context("Failed to update follow-up")?;
        Ok(count > 0)
    }

    pub fn delete_followup(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM followups WHERE id = ?1", params![id])
            .context("Failed to delete follow-up")?;
        Ok(count > 0)
    }
}
