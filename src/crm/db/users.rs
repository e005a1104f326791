use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};

use super::{CrmDb, collect_rows};
use crate::crm::forms::AccountFields;
use crate::crm::models::*;
use crate::crm::password::{hash_password, verify_password};
use crate::crm::scope::{Role, Viewer};

const USER_COLUMNS: &str = "u.id, u.username, u.email, u.first_name, u.last_name, \
     u.is_organisor, u.is_agent, u.is_superuser, u.date_joined";

fn user_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(offset)?,
        username: row.get(offset + 1)?,
        email: row.get(offset + 2)?,
        first_name: row.get(offset + 3)?,
        last_name: row.get(offset + 4)?,
        is_organisor: row.get(offset + 5)?,
        is_agent: row.get(offset + 6)?,
        is_superuser: row.get(offset + 7)?,
        date_joined: row.get(offset + 8)?,
    })
}

/// `a.id, a.organisation_id` followed by the user columns.
fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        organisation_id: row.get(1)?,
        user: user_from_row(row, 2)?,
    })
}

impl CrmDb {
    // ── Users ─────────────────────────────────────────────────────────

    /// Insert a user and its profile in one transaction.
    pub fn create_user(
        &self,
        fields: &AccountFields,
        is_organisor: bool,
        is_agent: bool,
        is_superuser: bool,
    ) -> Result<User> {
        let password_hash = match &fields.password {
            Some(p) => hash_password(p)?,
            None => String::new(),
        };
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO users (username, email, first_name, last_name, password_hash,
                                is_organisor, is_agent, is_superuser, date_joined)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                fields.username,
                fields.email,
                fields.first_name,
                fields.last_name,
                password_hash,
                is_organisor,
                is_agent,
                is_superuser,
                now_timestamp(),
            ],
        )
        .context("Failed to insert user")?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO user_profiles (user_id) VALUES (?1)",
            params![id],
        )
        .context("Failed to insert user profile")?;
        tx.commit().context("Failed to commit user creation")?;
        self.get_user(id)?.context("User not found after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM users u WHERE u.id = ?1", USER_COLUMNS),
                params![id],
                |row| user_from_row(row, 0),
            )
            .optional()
            .context("Failed to query user")
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM users u WHERE u.username = ?1", USER_COLUMNS),
                params![username],
                |row| user_from_row(row, 0),
            )
            .optional()
            .context("Failed to query user by username")
    }

    /// The user when `password` matches, `None` otherwise.
    pub fn verify_credentials(&self, username: &str, password: &str) -> Result<Option<User>> {
        let found: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT id, password_hash FROM users WHERE username = ?1",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to query credentials")?;
        match found {
            Some((id, hash)) if verify_password(password, &hash) => self.get_user(id),
            _ => Ok(None),
        }
    }

    pub fn username_taken(&self, username: &str, except_id: Option<i64>) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM users WHERE username = ?1 AND id IS NOT ?2",
                params![username, except_id],
                |row| row.get(0),
            )
            .context("Failed to check username")
    }

    /// Update account fields; the password only changes when one is given.
    pub fn update_user(&self, id: i64, fields: &AccountFields) -> Result<User> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "UPDATE users SET username = ?1, email = ?2, first_name = ?3, last_name = ?4 WHERE id = ?5",
            params![fields.username, fields.email, fields.first_name, fields.last_name, id],
        )
        .context("Failed to update user")?;
        if let Some(p) = &fields.password {
            tx.execute(
                "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                params![hash_password(p)?, id],
            )
            .context("Failed to update password")?;
        }
        tx.commit().context("Failed to commit user update")?;
        self.get_user(id)?.context("User not found after update")
    }

    pub fn count_users(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .context("Failed to count users")
    }

    // ── Organisations ─────────────────────────────────────────────────

    pub fn organisation_for_user(&self, user_id: i64) -> Result<Option<Organisation>> {
        self.conn
            .query_row(
                "SELECT id, user_id FROM user_profiles WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(Organisation {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                    })
                },
            )
            .optional()
            .context("Failed to query user profile")
    }

    /// The account that owns an organisation.
    pub fn organisation_owner(&self, organisation_id: i64) -> Result<Option<User>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM users u JOIN user_profiles p ON p.user_id = u.id WHERE p.id = ?1",
                    USER_COLUMNS
                ),
                params![organisation_id],
                |row| user_from_row(row, 0),
            )
            .optional()
            .context("Failed to query organisation owner")
    }

    /// Resolve role and organisation for an authenticated user.
    pub fn resolve_viewer(&self, user_id: i64) -> Result<Option<Viewer>> {
        let user = match self.get_user(user_id)? {
            Some(u) => u,
            None => return Ok(None),
        };
        let agent = self.find_agent_by_user(user_id)?;
        let viewer = if user.is_organisor {
            let org = self
                .organisation_for_user(user_id)?
                .context("Organisor has no profile")?;
            Viewer {
                user_id,
                role: Role::Organisor,
                organisation_id: Some(org.id),
                agent_id: agent.map(|a| a.id),
                is_superuser: user.is_superuser,
            }
        } else if let Some(agent) = agent {
            Viewer {
                user_id,
                role: Role::Agent,
                organisation_id: Some(agent.organisation_id),
                agent_id: Some(agent.id),
                is_superuser: user.is_superuser,
            }
        } else {
            Viewer {
                user_id,
                role: Role::Unaffiliated,
                organisation_id: None,
                agent_id: None,
                is_superuser: user.is_superuser,
            }
        };
        Ok(Some(viewer))
    }

    // ── Agents ────────────────────────────────────────────────────────

    pub fn create_agent(&self, user_id: i64, organisation_id: i64) -> Result<Agent> {
        self.conn
            .execute(
                "INSERT INTO agents (user_id, organisation_id) VALUES (?1, ?2)",
                params![user_id, organisation_id],
            )
            .context("Failed to insert agent")?;
        let id = self.conn.last_insert_rowid();
        self.get_agent(organisation_id, id)?
            .context("Agent not found after insert")
    }

    pub fn list_agents(&self, organisation_id: i64) -> Result<Vec<Agent>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT a.id, a.organisation_id, {} FROM agents a JOIN users u ON u.id = a.user_id
                 WHERE a.organisation_id = ?1 ORDER BY a.id",
                USER_COLUMNS
            ))
            .context("Failed to prepare list_agents")?;
        let rows = stmt
            .query_map(params![organisation_id], agent_from_row)
            .context("Failed to query agents")?;
        collect_rows(rows, "agent")
    }

    /// An agent of `organisation_id`; agents of other organisations are `None`.
    pub fn get_agent(&self, organisation_id: i64, id: i64) -> Result<Option<Agent>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT a.id, a.organisation_id, {} FROM agents a JOIN users u ON u.id = a.user_id
                     WHERE a.id = ?1 AND a.organisation_id = ?2",
                    USER_COLUMNS
                ),
                params![id, organisation_id],
                agent_from_row,
            )
            .optional()
            .context("Failed to query agent")
    }

    pub fn find_agent_by_user(&self, user_id: i64) -> Result<Option<Agent>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT a.id, a.organisation_id, {} FROM agents a JOIN users u ON u.id = a.user_id
                     WHERE a.user_id = ?1",
                    USER_COLUMNS
                ),
                params![user_id],
                agent_from_row,
            )
            .optional()
            .context("Failed to query agent by user")
    }

    /// Remove the agent record; its leads become unassigned and the user
    /// account stays.
    pub fn delete_agent(&self, organisation_id: i64, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM agents WHERE id = ?1 AND organisation_id = ?2",
                params![id, organisation_id],
            )
            .context("Failed to delete agent")?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::testutil::{account, agent, organisor};

    #[test]
    fn test_create_user_creates_profile() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let user = db.create_user(&account("owner"), true, false, false)?;
        assert_eq!(user.username, "owner");
        assert!(user.is_organisor);
        assert!(!user.date_joined.is_empty());

        let org = db.organisation_for_user(user.id)?.expect("profile exists");
        assert_eq!(org.user_id, user.id);
        assert_eq!(db.organisation_owner(org.id)?.map(|u| u.id), Some(user.id));
        Ok(())
    }

    #[test]
    fn test_duplicate_username_rejected() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        db.create_user(&account("owner"), true, false, false)?;
        assert!(db.username_taken("owner", None)?);
        assert!(!db.username_taken("someone", None)?);
        assert!(db.create_user(&account("owner"), true, false, false).is_err());
        Ok(())
    }

    #[test]
    fn test_username_taken_ignores_self() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let user = db.create_user(&account("owner"), true, false, false)?;
        assert!(!db.username_taken("owner", Some(user.id))?);
        Ok(())
    }

    #[test]
    fn test_verify_credentials() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        db.create_user(&account("owner"), true, false, false)?;
        assert!(db.verify_credentials("owner", "s3cure-pass")?.is_some());
        assert!(db.verify_credentials("owner", "wrong")?.is_none());
        assert!(db.verify_credentials("ghost", "s3cure-pass")?.is_none());
        Ok(())
    }

    #[test]
    fn test_update_user_keeps_password_when_absent() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let user = db.create_user(&account("ana"), false, true, false)?;
        let mut fields = account("ana2");
        fields.password = None;
        let updated = db.update_user(user.id, &fields)?;
        assert_eq!(updated.username, "ana2");
        assert!(db.verify_credentials("ana2", "s3cure-pass")?.is_some());

        fields.password = Some("another-pass".into());
        db.update_user(user.id, &fields)?;
        assert!(db.verify_credentials("ana2", "another-pass")?.is_some());
        Ok(())
    }

    #[test]
    fn test_resolve_viewer_roles() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (owner, org) = organisor(&db, "owner")?;
        let ag = agent(&db, org, "ana")?;
        let loner = db.create_user(&account("loner"), false, false, false)?;

        let v = db.resolve_viewer(owner.id)?.unwrap();
        assert_eq!(v.role, Role::Organisor);
        assert_eq!(v.organisation_id, Some(org));

        let v = db.resolve_viewer(ag.user.id)?.unwrap();
        assert_eq!(v.role, Role::Agent);
        assert_eq!(v.organisation_id, Some(org));
        assert_eq!(v.agent_id, Some(ag.id));

        let v = db.resolve_viewer(loner.id)?.unwrap();
        assert_eq!(v.role, Role::Unaffiliated);
        assert!(db.resolve_viewer(9999)?.is_none());
        Ok(())
    }

    #[test]
    fn test_agents_scoped_to_organisation() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let (_, org_a) = organisor(&db, "owner-a")?;
        let (_, org_b) = organisor(&db, "owner-b")?;
        let ag = agent(&db, org_a, "ana")?;
        agent(&db, org_b, "ben")?;

        assert_eq!(db.list_agents(org_a)?.len(), 1);
        assert!(db.get_agent(org_a, ag.id)?.is_some());
        assert!(db.get_agent(org_b, ag.id)?.is_none());
        assert!(!db.delete_agent(org_b, ag.id)?);
        assert!(db.delete_agent(org_a, ag.id)?);
        assert!(db.list_agents(org_a)?.is_empty());
        // The account survives the agent record.
        assert!(db.get_user(ag.user.id)?.is_some());
        Ok(())
    }
}
