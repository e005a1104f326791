use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

use super::leads::{LEAD_COLUMNS, lead_from_row};
use super::{CrmDb, collect_rows};
use crate::crm::models::*;
use crate::crm::scope::LeadScope;

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        organisation_id: row.get(2)?,
    })
}

impl CrmDb {
    pub fn create_category(&self, organisation_id: i64, name: &str) -> Result<Category> {
        self.conn
            .execute(
                "INSERT INTO categories (name, organisation_id) VALUES (?1, ?2)",
                params![name, organisation_id],
            )
            .context("Failed to insert category")?;
        Ok(Category {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            organisation_id,
        })
    }

    pub fn list_categories(&self, organisation_id: i64) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, organisation_id FROM categories
                 WHERE organisation_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare list_categories")?;
        let rows = stmt
            .query_map(params![organisation_id], category_from_row)
            .context("Failed to query categories")?;
        collect_rows(rows, "category")
    }

    pub fn get_category(&self, organisation_id: i64, id: i64) -> Result<Option<Category>> {
        self.conn
            .query_row(
                "SELECT id, name, organisation_id FROM categories
                 WHERE id = ?1 AND organisation_id = ?2",
                params![id, organisation_id],
                category_from_row,
            )
            .optional()
            .context("Failed to query category")
    }

    pub fn rename_category(
        &self,
        organisation_id: i64,
        id: i64,
        name: &str,
    ) -> Result<Option<Category>> {
        let count = self
            .conn
            .execute(
                "UPDATE categories SET name = ?1 WHERE id = ?2 AND organisation_id = ?3",
                params![name, id, organisation_id],
            )
            .context("Failed to rename category")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_category(organisation_id, id)
    }

    /// Delete a category; its leads keep existing without one.
    pub fn delete_category(&self, organisation_id: i64, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM categories WHERE id = ?1 AND organisation_id = ?2",
                params![id, organisation_id],
            )
            .context("Failed to delete category")?;
        Ok(count > 0)
    }

    /// First category of the organisation whose name matches
    /// case-insensitively, creating one named `name` when none does.
    pub fn find_or_create_category(&self, organisation_id: i64, name: &str) -> Result<Category> {
        let existing = self
            .conn
            .query_row(
                "SELECT id, name, organisation_id FROM categories
                 WHERE organisation_id = ?1 AND name = ?2 COLLATE NOCASE
                 ORDER BY id LIMIT 1",
                params![organisation_id, name],
                category_from_row,
            )
            .optional()
            .context("Failed to look up category")?;
        match existing {
            Some(category) => Ok(category),
            None => self.create_category(organisation_id, name),
        }
    }

    /// Leads of the organisation that have no category.
    pub fn uncategorised_lead_count(&self, organisation_id: i64) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM leads WHERE organisation_id = ?1 AND category_id IS NULL",
                params![organisation_id],
                |row| row.get(0),
            )
            .context("Failed to count uncategorised leads")
    }

    pub fn category_listing(&self, organisation_id: i64) -> Result<CategoryListing> {
        Ok(CategoryListing {
            categories: self.list_categories(organisation_id)?,
            unassigned_lead_count: self.uncategorised_lead_count(organisation_id)?,
        })
    }

    /// A category with the leads in it that `scope` can see.
    pub fn category_detail(&self, scope: LeadScope, id: i64) -> Result<Option<CategoryDetail>> {
        let organisation_id = match scope.organisation() {
            Some(org) => org,
            None => return Ok(None),
        };
        let category = match self.get_category(organisation_id, id)? {
            Some(c) => c,
            None => return Ok(None),
        };

        let (clause, mut values) = scope.sql();
        values.push(Value::Integer(id));
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM leads l WHERE {} AND l.category_id = ? ORDER BY l.id",
                LEAD_COLUMNS, clause
            ))
            .context("Failed to prepare category leads")?;
        let rows = stmt
            .query_map(params_from_iter(values), lead_from_row)
            .context("Failed to query category leads")?;
        let leads = collect_rows(rows, "lead")?;
        Ok(Some(CategoryDetail { category, leads }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::testutil::{agent, lead, organisor};

    #[test]
    fn test_category_crud_scoped() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org_a) = organisor(&db, "owner-a")?;
        let (_, org_b) = organisor(&db, "owner-b")?;
        let cat = db.create_category(org_a, "Contacted")?;

        assert!(db.get_category(org_b, cat.id)?.is_none());
        assert!(db.rename_category(org_b, cat.id, "Hijacked")?.is_none());
        let renamed = db.rename_category(org_a, cat.id, "Called")?.unwrap();
        assert_eq!(renamed.name, "Called");
        assert!(!db.delete_category(org_b, cat.id)?);
        assert!(db.delete_category(org_a, cat.id)?);
        assert!(db.list_categories(org_a)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_delete_category_unsets_leads() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org) = organisor(&db, "owner")?;
        let cat = db.create_category(org, "Contacted")?;
        let l = lead(&db, org, "Arta", None)?;
        db.change_category(LeadScope::Organisation(org), l.id, Some(cat.id))?;
        db.delete_category(org, cat.id)?;
        let l = db.get_lead(LeadScope::Organisation(org), l.id)?.unwrap();
        assert_eq!(l.category_id, None);
        Ok(())
    }

    #[test]
    fn test_find_or_create_is_case_insensitive() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org_a) = organisor(&db, "owner-a")?;
        let (_, org_b) = organisor(&db, "owner-b")?;
        let existing = db.create_category(org_a, "NEW")?;

        assert_eq!(db.find_or_create_category(org_a, INTAKE_CATEGORY)?.id, existing.id);
        let created = db.find_or_create_category(org_b, INTAKE_CATEGORY)?;
        assert_eq!(created.name, "New");
        assert_eq!(created.organisation_id, org_b);
        assert_eq!(db.find_or_create_category(org_b, "new")?.id, created.id);
        Ok(())
    }

    #[test]
    fn test_listing_counts_uncategorised() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org) = organisor(&db, "owner")?;
        let cat = db.create_category(org, "Contacted")?;
        let l = lead(&db, org, "Arta", None)?;
        lead(&db, org, "Besa", None)?;
        db.change_category(LeadScope::Organisation(org), l.id, Some(cat.id))?;

        let listing = db.category_listing(org)?;
        assert_eq!(listing.categories.len(), 1);
        assert_eq!(listing.unassigned_lead_count, 1);
        Ok(())
    }

    #[test]
    fn test_category_detail_follows_scope() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org) = organisor(&db, "owner")?;
        let ana = agent(&db, org, "ana")?;
        let cat = db.create_category(org, "Contacted")?;
        let mine = lead(&db, org, "Arta", Some(ana.id))?;
        let other = lead(&db, org, "Besa", None)?;
        for id in [mine.id, other.id] {
            db.change_category(LeadScope::Organisation(org), id, Some(cat.id))?;
        }

        let full = db.category_detail(LeadScope::Organisation(org), cat.id)?.unwrap();
        assert_eq!(full.leads.len(), 2);

        let agent_scope = LeadScope::Assigned {
            organisation_id: org,
            agent_id: ana.id,
        };
        let partial = db.category_detail(agent_scope, cat.id)?.unwrap();
        assert_eq!(partial.leads.len(), 1);
        assert_eq!(partial.leads[0].id, mine.id);

        assert!(db.category_detail(LeadScope::Nothing, cat.id)?.is_none());
        Ok(())
    }
}
