//! Fixtures shared by the unit tests.

use anyhow::Result;

use crate::crm::db::CrmDb;
use crate::crm::forms::AccountFields;
use crate::crm::models::{Agent, Lead, LeadFields, User};

pub const TEST_PASSWORD: &str = "s3cure-pass";

pub fn account(username: &str) -> AccountFields {
    AccountFields {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        first_name: username.to_string(),
        last_name: "Test".to_string(),
        password: Some(TEST_PASSWORD.to_string()),
    }
}

/// An organisor and the id of their organisation.
pub fn organisor(db: &CrmDb, username: &str) -> Result<(User, i64)> {
    let user = db.create_user(&account(username), true, false, false)?;
    let org = db
        .organisation_for_user(user.id)?
        .ok_or_else(|| anyhow::anyhow!("profile missing for {}", username))?;
    Ok((user, org.id))
}

pub fn agent(db: &CrmDb, organisation_id: i64, username: &str) -> Result<Agent> {
    let user = db.create_user(&account(username), false, true, false)?;
    db.create_agent(user.id, organisation_id)
}

pub fn lead_fields(first: &str, agent_id: Option<i64>) -> LeadFields {
    LeadFields {
        first_name: first.to_string(),
        last_name: "Doe".to_string(),
        age: 30,
        description: String::new(),
        phone_number: "0691234567".to_string(),
        email: format!("{}@leads.test", first.to_lowercase()),
        agent_id,
    }
}

pub fn lead(db: &CrmDb, organisation_id: i64, first: &str, agent_id: Option<i64>) -> Result<Lead> {
    db.create_lead(organisation_id, &lead_fields(first, agent_id), None)
}
