use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

use super::{CrmDb, collect_rows, id_chunks, placeholders};
use crate::crm::models::*;
use crate::crm::scope::LeadScope;

pub(super) const LEAD_COLUMNS: &str = "l.id, l.organisation_id, l.first_name, l.last_name, l.age, \
     l.description, l.phone_number, l.email, l.agent_id, l.category_id, l.date_added, \
     l.converted_date";

pub(super) fn lead_from_row(row: &Row<'_>) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: row.get(0)?,
        organisation_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        age: row.get(4)?,
        description: row.get(5)?,
        phone_number: row.get(6)?,
        email: row.get(7)?,
        agent_id: row.get(8)?,
        category_id: row.get(9)?,
        date_added: row.get(10)?,
        converted_date: row.get(11)?,
    })
}

/// Escape LIKE wildcards so user input matches literally.
fn like_pattern(q: &str) -> String {
    let mut out = String::with_capacity(q.len() + 2);
    out.push('%');
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

impl CrmDb {
    pub fn create_lead(
        &self,
        organisation_id: i64,
        fields: &LeadFields,
        category_id: Option<i64>,
    ) -> Result<Lead> {
        self.conn
            .execute(
                "INSERT INTO leads (organisation_id, first_name, last_name, age, description,
                                    phone_number, email, agent_id, category_id, date_added)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    organisation_id,
                    fields.first_name,
                    fields.last_name,
                    fields.age,
                    fields.description,
                    fields.phone_number,
                    fields.email,
                    fields.agent_id,
                    category_id,
                    now_timestamp(),
                ],
            )
            .context("Failed to insert lead")?;
        let id = self.conn.last_insert_rowid();
        self.get_lead(LeadScope::Organisation(organisation_id), id)?
            .context("Lead not found after insert")
    }

    /// A lead visible under `scope`.
    pub fn get_lead(&self, scope: LeadScope, id: i64) -> Result<Option<Lead>> {
        let (clause, mut values) = scope.sql();
        values.push(Value::Integer(id));
        let sql = format!(
            "SELECT {} FROM leads l WHERE {} AND l.id = ?",
            LEAD_COLUMNS, clause
        );
        self.conn
            .query_row(&sql, params_from_iter(values), lead_from_row)
            .optional()
            .context("Failed to query lead")
    }

    /// Assigned leads visible under `scope`, searched, filtered and sorted.
    /// Returns the full sequence; paging is up to the caller.
    pub fn list_leads(&self, scope: LeadScope, filter: &LeadFilter) -> Result<Vec<Lead>> {
        let (clause, mut values) = scope.sql();
        let mut sql = format!(
            "SELECT {} FROM leads l WHERE {} AND l.agent_id IS NOT NULL",
            LEAD_COLUMNS, clause
        );

        if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            sql.push_str(
                " AND (l.first_name LIKE ? ESCAPE '\\' OR l.last_name LIKE ? ESCAPE '\\'
                       OR l.phone_number LIKE ? ESCAPE '\\' OR l.email LIKE ? ESCAPE '\\'
                       OR CAST(l.id AS TEXT) = ?)",
            );
            let pattern = like_pattern(q);
            for _ in 0..4 {
                values.push(Value::Text(pattern.clone()));
            }
            values.push(Value::Text(q.to_string()));
        }
        if let Some(agent_id) = filter.agent_id {
            sql.push_str(" AND l.agent_id = ?");
            values.push(Value::Integer(agent_id));
        }
        if let Some(category_id) = filter.category_id {
            sql.push_str(" AND l.category_id = ?");
            values.push(Value::Integer(category_id));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(LeadSort::order_by(filter.sort));

        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_leads")?;
        let rows = stmt
            .query_map(params_from_iter(values), lead_from_row)
            .context("Failed to query leads")?;
        collect_rows(rows, "lead")
    }

    pub fn unassigned_leads(&self, organisation_id: i64) -> Result<Vec<Lead>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM leads l WHERE l.organisation_id = ?1 AND l.agent_id IS NULL
                 ORDER BY l.id",
                LEAD_COLUMNS
            ))
            .context("Failed to prepare unassigned_leads")?;
        let rows = stmt
            .query_map(params![organisation_id], lead_from_row)
            .context("Failed to query unassigned leads")?;
        collect_rows(rows, "lead")
    }

    /// Rewrite the editable fields of a lead. The organisation is never
    /// touched.
    pub fn update_lead(
        &self,
        organisation_id: i64,
        id: i64,
        fields: &LeadFields,
    ) -> Result<Option<Lead>> {
        let count = self
            .conn
            .execute(
                "UPDATE leads SET first_name = ?1, last_name = ?2, age = ?3, description = ?4,
                                  phone_number = ?5, email = ?6, agent_id = ?7
                 WHERE id = ?8 AND organisation_id = ?9",
                params![
                    fields.first_name,
                    fields.last_name,
                    fields.age,
                    fields.description,
                    fields.phone_number,
                    fields.email,
                    fields.agent_id,
                    id,
                    organisation_id,
                ],
            )
            .context("Failed to update lead")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_lead(LeadScope::Organisation(organisation_id), id)
    }

    pub fn delete_lead(&self, organisation_id: i64, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM leads WHERE id = ?1 AND organisation_id = ?2",
                params![id, organisation_id],
            )
            .context("Failed to delete lead")?;
        Ok(count > 0)
    }

    /// Assign one lead. The agent must belong to the lead's organisation.
    pub fn assign_lead(
        &self,
        organisation_id: i64,
        id: i64,
        agent_id: i64,
    ) -> Result<Option<Lead>> {
        let count = self
            .conn
            .execute(
                "UPDATE leads SET agent_id = ?1
                 WHERE id = ?2 AND organisation_id = ?3
                   AND EXISTS (SELECT 1 FROM agents WHERE id = ?1 AND organisation_id = ?3)",
                params![agent_id, id, organisation_id],
            )
            .context("Failed to assign lead")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_lead(LeadScope::Organisation(organisation_id), id)
    }

    /// Assign every listed lead of the organisation to `agent_id` in one
    /// transaction. Returns the updated count and up to three first names of
    /// the assigned leads in id order.
    pub fn bulk_assign(
        &self,
        organisation_id: i64,
        lead_ids: &[i64],
        agent_id: i64,
    ) -> Result<(usize, Vec<String>)> {
        if lead_ids.is_empty() {
            return Ok((0, Vec::new()));
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let mut updated = 0;
        let mut names = Vec::new();
        // Chunks come out in ascending id order, so the first names found
        // are the lowest ids overall.
        for chunk in id_chunks(lead_ids) {
            let marks = placeholders(chunk.len());
            let mut values = vec![Value::Integer(agent_id)];
            values.extend(chunk.iter().map(|&id| Value::Integer(id)));
            values.push(Value::Integer(organisation_id));
            values.push(Value::Integer(agent_id));
            values.push(Value::Integer(organisation_id));
            let count = tx
                .execute(
                    &format!(
                        "UPDATE leads SET agent_id = ?
                         WHERE id IN ({}) AND organisation_id = ?
                           AND EXISTS (SELECT 1 FROM agents WHERE id = ? AND organisation_id = ?)",
                        marks
                    ),
                    params_from_iter(values),
                )
                .context("Failed to bulk assign leads")?;
            updated += count;

            if count > 0 && names.len() < 3 {
                let mut values: Vec<Value> = chunk.iter().map(|&id| Value::Integer(id)).collect();
                values.push(Value::Integer(organisation_id));
                values.push(Value::Integer((3 - names.len()) as i64));
                let mut stmt = tx
                    .prepare(&format!(
                        "SELECT first_name FROM leads WHERE id IN ({}) AND organisation_id = ?
                         ORDER BY id LIMIT ?",
                        marks
                    ))
                    .context("Failed to prepare assigned names")?;
                let rows = stmt
                    .query_map(params_from_iter(values), |row| row.get::<_, String>(0))
                    .context("Failed to query assigned names")?;
                names.extend(collect_rows(rows, "lead name")?);
            }
        }
        tx.commit().context("Failed to commit bulk assign")?;
        Ok((updated, names))
    }

    /// Move a lead to `category_id` (or clear it). `converted_date` is
    /// stamped only when the target is the organisation's `Converted`
    /// category and the lead was not already in it; the comparison happens
    /// inside the same UPDATE.
    pub fn change_category(
        &self,
        scope: LeadScope,
        id: i64,
        category_id: Option<i64>,
    ) -> Result<Option<Lead>> {
        let (clause, scope_values) = scope.sql();
        let sql = format!(
            "UPDATE leads AS l SET
                converted_date = CASE
                    WHEN ?1 IS NOT NULL
                     AND l.category_id IS NOT ?1
                     AND EXISTS (SELECT 1 FROM categories c
                                 WHERE c.id = ?1 AND c.organisation_id = l.organisation_id
                                   AND c.name = ?2)
                    THEN ?3 ELSE l.converted_date END,
                category_id = ?1
             WHERE l.id = ?4 AND {}",
            clause
        );
        let mut values = vec![
            category_id.map(Value::Integer).unwrap_or(Value::Null),
            Value::Text(CONVERTED_CATEGORY.to_string()),
            Value::Text(now_timestamp()),
            Value::Integer(id),
        ];
        values.extend(scope_values);
        let count = self
            .conn
            .execute(&sql, params_from_iter(values))
            .context("Failed to change lead category")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_lead(scope, id)
    }

    pub fn lead_detail(&self, scope: LeadScope, id: i64) -> Result<Option<LeadDetail>> {
        let lead = match self.get_lead(scope, id)? {
            Some(l) => l,
            None => return Ok(None),
        };
        let agent = match lead.agent_id {
            Some(agent_id) => self.get_agent(lead.organisation_id, agent_id)?,
            None => None,
        };
        let category = match lead.category_id {
            Some(category_id) => self.get_category(lead.organisation_id, category_id)?,
            None => None,
        };
        let followups = self.list_followups(lead.id)?;
        Ok(Some(LeadDetail {
            lead,
            agent,
            category,
            followups,
        }))
    }

    pub fn dashboard_stats(&self, organisation_id: i64) -> Result<DashboardStats> {
        let since = format_timestamp(Utc::now() - Duration::days(30));
        self.conn
            .query_row(
                "SELECT
                    COUNT(*),
                    COALESCE(SUM(l.date_added >= ?2), 0),
                    COALESCE(SUM(c.name = ?3 AND l.converted_date >= ?2), 0)
                 FROM leads l LEFT JOIN categories c ON c.id = l.category_id
                 WHERE l.organisation_id = ?1",
                params![organisation_id, since, CONVERTED_CATEGORY],
                |row| {
                    Ok(DashboardStats {
                        total_lead_count: row.get(0)?,
                        total_in_past30: row.get(1)?,
                        converted_in_past30: row.get(2)?,
                    })
                },
            )
            .context("Failed to compute dashboard stats")
    }

    /// Leads assigned to the agent record of `user_id`.
    pub fn assigned_lead_count(&self, user_id: i64) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM leads l JOIN agents a ON a.id = l.agent_id
                 WHERE a.user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .context("Failed to count assigned leads")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::testutil::{agent, lead, lead_fields, organisor};

    #[test]
    fn test_scoping_by_role() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org_a) = organisor(&db, "owner-a")?;
        let (_, org_b) = organisor(&db, "owner-b")?;
        let ana = agent(&db, org_a, "ana")?;
        let ben = agent(&db, org_a, "ben")?;

        let l1 = lead(&db, org_a, "Arta", Some(ana.id))?;
        let l2 = lead(&db, org_a, "Besa", Some(ben.id))?;
        let foreign = lead(&db, org_b, "Cima", None)?;

        let org_scope = LeadScope::Organisation(org_a);
        let ana_scope = LeadScope::Assigned {
            organisation_id: org_a,
            agent_id: ana.id,
        };

        let ids: Vec<i64> = db
            .list_leads(org_scope, &LeadFilter::default())?
            .iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec![l1.id, l2.id]);

        let ids: Vec<i64> = db
            .list_leads(ana_scope, &LeadFilter::default())?
            .iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec![l1.id]);

        assert!(db.get_lead(ana_scope, l2.id)?.is_none());
        assert!(db.get_lead(org_scope, foreign.id)?.is_none());
        assert!(db.list_leads(LeadScope::Nothing, &LeadFilter::default())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_list_excludes_unassigned() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org) = organisor(&db, "owner")?;
        let ana = agent(&db, org, "ana")?;
        lead(&db, org, "Arta", Some(ana.id))?;
        let loose = lead(&db, org, "Besa", None)?;

        let listed = db.list_leads(LeadScope::Organisation(org), &LeadFilter::default())?;
        assert_eq!(listed.len(), 1);
        let unassigned = db.unassigned_leads(org)?;
        assert_eq!(unassigned.len(), 1);
        assert_eq!(unassigned[0].id, loose.id);
        Ok(())
    }

    #[test]
    fn test_search_filter_and_sort() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org) = organisor(&db, "owner")?;
        let ana = agent(&db, org, "ana")?;
        let ben = agent(&db, org, "ben")?;
        // Phones use only 0, 6, 8 and 9 so a search for a small id cannot
        // also match one as a substring.
        let with_phone = |first: &str, agent_id: i64, phone: &str| {
            let mut fields = lead_fields(first, Some(agent_id));
            fields.phone_number = phone.to_string();
            db.create_lead(org, &fields, None)
        };
        let arta = with_phone("Arta", ana.id, "0690000000")?;
        let zana = with_phone("Zana", ben.id, "0698888888")?;
        let besa = with_phone("Besa", ana.id, "0699999999")?;
        let scope = LeadScope::Organisation(org);
        assert!(besa.id < 6);

        let filter = LeadFilter {
            q: Some("AN".into()),
            ..Default::default()
        };
        let ids: Vec<i64> = db.list_leads(scope, &filter)?.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![zana.id]);

        let filter = LeadFilter {
            q: Some(besa.id.to_string()),
            ..Default::default()
        };
        let ids: Vec<i64> = db.list_leads(scope, &filter)?.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![besa.id]);

        // Phone numbers match on any substring.
        let filter = LeadFilter {
            q: Some("8888".into()),
            ..Default::default()
        };
        let ids: Vec<i64> = db.list_leads(scope, &filter)?.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![zana.id]);

        let filter = LeadFilter {
            agent_id: Some(ana.id),
            sort: Some(LeadSort::FirstDesc),
            ..Default::default()
        };
        let ids: Vec<i64> = db.list_leads(scope, &filter)?.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![besa.id, arta.id]);
        Ok(())
    }

    #[test]
    fn test_search_treats_wildcards_literally() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org) = organisor(&db, "owner")?;
        let ana = agent(&db, org, "ana")?;
        lead(&db, org, "Arta", Some(ana.id))?;
        let filter = LeadFilter {
            q: Some("%".into()),
            ..Default::default()
        };
        assert!(db.list_leads(LeadScope::Organisation(org), &filter)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_update_never_moves_organisation() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org_a) = organisor(&db, "owner-a")?;
        let (_, org_b) = organisor(&db, "owner-b")?;
        let l = lead(&db, org_a, "Arta", None)?;

        let mut fields = lead_fields("Arta", None);
        fields.last_name = "Kola".into();
        assert!(db.update_lead(org_b, l.id, &fields)?.is_none());

        let updated = db.update_lead(org_a, l.id, &fields)?.unwrap();
        assert_eq!(updated.last_name, "Kola");
        assert_eq!(updated.organisation_id, org_a);
        Ok(())
    }

    #[test]
    fn test_delete_scoped() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org_a) = organisor(&db, "owner-a")?;
        let (_, org_b) = organisor(&db, "owner-b")?;
        let l = lead(&db, org_a, "Arta", None)?;
        assert!(!db.delete_lead(org_b, l.id)?);
        assert!(db.delete_lead(org_a, l.id)?);
        assert!(db.get_lead(LeadScope::Organisation(org_a), l.id)?.is_none());
        Ok(())
    }

    #[test]
    fn test_assign_rejects_foreign_agent() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org_a) = organisor(&db, "owner-a")?;
        let (_, org_b) = organisor(&db, "owner-b")?;
        let ana = agent(&db, org_a, "ana")?;
        let outsider = agent(&db, org_b, "zed")?;
        let l = lead(&db, org_a, "Arta", None)?;

        assert!(db.assign_lead(org_a, l.id, outsider.id)?.is_none());
        let assigned = db.assign_lead(org_a, l.id, ana.id)?.unwrap();
        assert_eq!(assigned.agent_id, Some(ana.id));
        Ok(())
    }

    #[test]
    fn test_bulk_assign_counts_and_names() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org_a) = organisor(&db, "owner-a")?;
        let (_, org_b) = organisor(&db, "owner-b")?;
        let ana = agent(&db, org_a, "ana")?;
        let mut ids = Vec::new();
        for name in ["Arta", "Besa", "Cima", "Dita", "Era"] {
            ids.push(lead(&db, org_a, name, None)?.id);
        }
        let foreign = lead(&db, org_b, "Fjolla", None)?;
        ids.push(foreign.id);

        let (count, names) = db.bulk_assign(org_a, &ids, ana.id)?;
        assert_eq!(count, 5);
        assert_eq!(names, vec!["Arta", "Besa", "Cima"]);
        let untouched = db.get_lead(LeadScope::Organisation(org_b), foreign.id)?.unwrap();
        assert_eq!(untouched.agent_id, None);
        Ok(())
    }

    #[test]
    fn test_bulk_assign_foreign_agent_updates_nothing() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org_a) = organisor(&db, "owner-a")?;
        let (_, org_b) = organisor(&db, "owner-b")?;
        let outsider = agent(&db, org_b, "zed")?;
        let l = lead(&db, org_a, "Arta", None)?;
        let (count, names) = db.bulk_assign(org_a, &[l.id], outsider.id)?;
        assert_eq!(count, 0);
        assert!(names.is_empty());
        Ok(())
    }

    #[test]
    fn test_bulk_assign_with_very_long_id_list() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org) = organisor(&db, "owner")?;
        let ana = agent(&db, org, "ana")?;
        let besa = lead(&db, org, "Besa", None)?;
        let arta = lead(&db, org, "Arta", None)?;

        // Far past SQLite's per-statement parameter limit.
        let mut ids: Vec<i64> = (100_000..140_000).collect();
        ids.push(arta.id);
        ids.push(besa.id);
        ids.push(arta.id);

        let (count, names) = db.bulk_assign(org, &ids, ana.id)?;
        assert_eq!(count, 2);
        assert_eq!(names, vec!["Besa", "Arta"]);
        let scope = LeadScope::Organisation(org);
        assert_eq!(db.get_lead(scope, arta.id)?.unwrap().agent_id, Some(ana.id));
        assert_eq!(db.get_lead(scope, besa.id)?.unwrap().agent_id, Some(ana.id));
        Ok(())
    }

    #[test]
    fn test_conversion_date_set_once() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org) = organisor(&db, "owner")?;
        let converted = db.create_category(org, CONVERTED_CATEGORY)?;
        let contacted = db.create_category(org, "Contacted")?;
        let l = lead(&db, org, "Arta", None)?;
        let scope = LeadScope::Organisation(org);

        let moved = db.change_category(scope, l.id, Some(contacted.id))?.unwrap();
        assert_eq!(moved.converted_date, None);

        let moved = db.change_category(scope, l.id, Some(converted.id))?.unwrap();
        let first_stamp = moved.converted_date.clone().expect("stamped");

        // Re-saving into Converted keeps the original stamp.
        db.conn.execute(
            "UPDATE leads SET converted_date = '2000-01-01T00:00:00.000000Z' WHERE id = ?1",
            params![l.id],
        )?;
        let again = db.change_category(scope, l.id, Some(converted.id))?.unwrap();
        assert_eq!(again.converted_date.as_deref(), Some("2000-01-01T00:00:00.000000Z"));
        assert_ne!(first_stamp, "2000-01-01T00:00:00.000000Z");

        // Leaving Converted keeps the date too.
        let left = db.change_category(scope, l.id, None)?.unwrap();
        assert_eq!(left.category_id, None);
        assert!(left.converted_date.is_some());
        Ok(())
    }

    #[test]
    fn test_conversion_ignores_other_organisations_converted() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org_a) = organisor(&db, "owner-a")?;
        let (_, org_b) = organisor(&db, "owner-b")?;
        let foreign_converted = db.create_category(org_b, CONVERTED_CATEGORY)?;
        let l = lead(&db, org_a, "Arta", None)?;
        let moved = db
            .change_category(LeadScope::Organisation(org_a), l.id, Some(foreign_converted.id))?
            .unwrap();
        assert_eq!(moved.converted_date, None);
        Ok(())
    }

    #[test]
    fn test_change_category_respects_agent_scope() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org) = organisor(&db, "owner")?;
        let ana = agent(&db, org, "ana")?;
        let ben = agent(&db, org, "ben")?;
        let cat = db.create_category(org, "Contacted")?;
        let l = lead(&db, org, "Arta", Some(ben.id))?;
        let ana_scope = LeadScope::Assigned {
            organisation_id: org,
            agent_id: ana.id,
        };
        assert!(db.change_category(ana_scope, l.id, Some(cat.id))?.is_none());
        Ok(())
    }

    #[test]
    fn test_dashboard_stats() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org) = organisor(&db, "owner")?;
        let converted = db.create_category(org, CONVERTED_CATEGORY)?;
        let fresh = lead(&db, org, "Arta", None)?;
        let old = lead(&db, org, "Besa", None)?;
        db.conn.execute(
            "UPDATE leads SET date_added = '2001-01-01T00:00:00.000000Z' WHERE id = ?1",
            params![old.id],
        )?;
        db.change_category(LeadScope::Organisation(org), fresh.id, Some(converted.id))?;

        let stats = db.dashboard_stats(org)?;
        assert_eq!(
            stats,
            DashboardStats {
                total_lead_count: 2,
                total_in_past30: 1,
                converted_in_past30: 1,
            }
        );
        Ok(())
    }

    #[test]
    fn test_lead_detail_resolves_relations() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (owner, org) = organisor(&db, "owner")?;
        let ana = agent(&db, org, "ana")?;
        let l = lead(&db, org, "Arta", Some(ana.id))?;
        db.create_followup(l.id, Some(owner.id), "Called")?;

        let detail = db.lead_detail(LeadScope::Organisation(org), l.id)?.unwrap();
        assert_eq!(detail.agent.map(|a| a.id), Some(ana.id));
        assert!(detail.category.is_none());
        assert_eq!(detail.followups.len(), 1);
        assert_eq!(db.assigned_lead_count(ana.user.id)?, 1);
        Ok(())
    }
}
