//! Request payloads and their validation.
//!
//! Every form validates completely before anything is written; a failure
//! yields `FieldErrors` for the whole payload.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::models::LeadFields;
use super::password::password_problems;
use crate::errors::FieldErrors;

const REQUIRED: &str = "This field is required.";

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid")
});

static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]{1,150}$").expect("username regex is valid"));

fn trimmed(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

fn require(errors: &mut FieldErrors, field: &str, value: &Option<String>) -> String {
    let value = trimmed(value);
    if value.is_empty() {
        errors.add(field, REQUIRED);
    }
    value
}

fn check_max_len(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.add(
            field,
            format!("Ensure this value has at most {} characters.", max),
        );
    }
}

fn check_email(errors: &mut FieldErrors, field: &str, value: &str) {
    if !value.is_empty() && !EMAIL_REGEX.is_match(value) {
        errors.add(field, "Enter a valid email address.");
    }
}

/// Check a password pair. Empty pair passes when `required` is false.
fn check_passwords(
    errors: &mut FieldErrors,
    password1: &Option<String>,
    password2: &Option<String>,
    username: &str,
    required: bool,
) -> Option<String> {
    let p1 = password1.clone().unwrap_or_default();
    let p2 = password2.clone().unwrap_or_default();
    if p1.is_empty() && p2.is_empty() {
        if required {
            errors.add("password1", REQUIRED);
        }
        return None;
    }
    if p1 != p2 {
        errors.add("password2", "Password-et nuk përputhen.");
        return None;
    }
    let problems = password_problems(&p1, username);
    if !problems.is_empty() {
        for p in problems {
            errors.add("password1", p);
        }
        return None;
    }
    Some(p1)
}

// ── Accounts ──────────────────────────────────────────────────────────

/// Cleaned account fields for creating or updating a user.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountFields {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// New password; `None` keeps the current one.
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountForm {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password1: Option<String>,
    pub password2: Option<String>,
}

impl AccountForm {
    /// `password_required` is true for new accounts.
    pub fn validate(&self, password_required: bool) -> Result<AccountFields, FieldErrors> {
        let mut errors = FieldErrors::new();
        let username = require(&mut errors, "username", &self.username);
        if !username.is_empty() && !USERNAME_REGEX.is_match(&username) {
            errors.add(
                "username",
                "Enter a valid username. Letters, digits and @/./+/-/_ only.",
            );
        }
        let email = require(&mut errors, "email", &self.email);
        check_email(&mut errors, "email", &email);
        let first_name = trimmed(&self.first_name);
        let last_name = trimmed(&self.last_name);
        check_max_len(&mut errors, "first_name", &first_name, 150);
        check_max_len(&mut errors, "last_name", &last_name, 150);
        let password = check_passwords(
            &mut errors,
            &self.password1,
            &self.password2,
            &username,
            password_required,
        );
        errors.into_result()?;
        Ok(AccountFields {
            username,
            email,
            first_name,
            last_name,
            password,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

// ── Leads ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<i64>,
    pub description: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub agent: Option<i64>,
}

impl LeadForm {
    /// Field-level checks. Agent ownership is checked against the database
    /// by the caller.
    pub fn validate(&self) -> Result<LeadFields, FieldErrors> {
        let mut errors = FieldErrors::new();
        let first_name = require(&mut errors, "first_name", &self.first_name);
        let last_name = require(&mut errors, "last_name", &self.last_name);
        check_max_len(&mut errors, "first_name", &first_name, 20);
        check_max_len(&mut errors, "last_name", &last_name, 20);
        let email = require(&mut errors, "email", &self.email);
        check_email(&mut errors, "email", &email);
        let phone_number = trimmed(&self.phone_number);
        check_max_len(&mut errors, "phone_number", &phone_number, 20);
        let age = self.age.unwrap_or(0);
        if age < 0 {
            errors.add("age", "Ensure this value is greater than or equal to 0.");
        }
        errors.into_result()?;
        Ok(LeadFields {
            first_name,
            last_name,
            age,
            description: trimmed(&self.description),
            phone_number,
            email,
            agent_id: self.agent,
        })
    }
}

/// The unauthenticated intake form. Only names and email are required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicLeadForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub age: Option<String>,
    pub service: Option<String>,
    pub source: Option<String>,
}

impl PublicLeadForm {
    pub fn validate(&self) -> Result<LeadFields, FieldErrors> {
        let mut errors = FieldErrors::new();
        let first_name = require(&mut errors, "first_name", &self.first_name);
        let last_name = require(&mut errors, "last_name", &self.last_name);
        let email = require(&mut errors, "email", &self.email);
        check_email(&mut errors, "email", &email);
        let age_raw = trimmed(&self.age);
        let age = if age_raw.is_empty() {
            0
        } else {
            match age_raw.parse::<i64>() {
                Ok(age) if age >= 0 => age,
                _ => {
                    errors.add("age", "Enter a whole number.");
                    0
                }
            }
        };
        errors.into_result()?;
        let description = match trimmed(&self.service) {
            s if s.is_empty() => String::new(),
            s => format!("Service: {}", s),
        };
        Ok(LeadFields {
            first_name,
            last_name,
            age,
            description,
            phone_number: trimmed(&self.phone_number),
            email,
            agent_id: None,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryChangeForm {
    /// `None` clears the category.
    pub category: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignAgentForm {
    pub agent: Option<i64>,
}

impl AssignAgentForm {
    pub fn validate(&self) -> Result<i64, FieldErrors> {
        self.agent
            .ok_or_else(|| FieldErrors::single("agent", REQUIRED))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkAssignForm {
    #[serde(default)]
    pub lead_ids: Vec<i64>,
    pub agent_id: Option<i64>,
}

impl BulkAssignForm {
    pub fn validate(&self) -> Result<(Vec<i64>, i64), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.lead_ids.is_empty() {
            errors.add("lead_ids", "Zgjidh së paku një lead.");
        }
        if self.agent_id.is_none() {
            errors.add("agent_id", "Zgjidh një agent.");
        }
        errors.into_result()?;
        let mut ids = self.lead_ids.clone();
        ids.sort_unstable();
        ids.dedup();
        Ok((ids, self.agent_id.unwrap_or_default()))
    }
}

// ── Categories & follow-ups ───────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryForm {
    pub name: Option<String>,
}

impl CategoryForm {
    pub fn validate(&self) -> Result<String, FieldErrors> {
        let mut errors = FieldErrors::new();
        let name = require(&mut errors, "name", &self.name);
        check_max_len(&mut errors, "name", &name, 30);
        errors.into_result()?;
        Ok(name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FollowUpForm {
    pub notes: Option<String>,
}

impl FollowUpForm {
    pub fn cleaned(&self) -> String {
        trimmed(&self.notes)
    }
}

// ── Notifications ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarkReadForm {
    #[serde(default)]
    pub ids: Vec<i64>,
    #[serde(default)]
    pub all: bool,
}
