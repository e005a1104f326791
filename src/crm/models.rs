use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout used for every stored date. Fixed width, so string order
/// equals chronological order inside SQLite.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Name of the category that stamps `converted_date`.
pub const CONVERTED_CATEGORY: &str = "Converted";

/// Category given to leads arriving through the public form.
pub const INTAKE_CATEGORY: &str = "New";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Parse an ISO-8601 timestamp. Accepts RFC 3339 with an offset, or a naive
/// date-time which is taken as UTC.
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, layout) {
            return Some(naive.and_utc());
        }
    }
    None
}

// ── Users & organisations ─────────────────────────────────────────────

/// A user account as exposed over the API (no password hash).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_organisor: bool,
    pub is_agent: bool,
    pub is_superuser: bool,
    pub date_joined: String,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Profile row; an organisor's organisation is their own profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organisation {
    pub id: i64,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: i64,
    pub organisation_id: i64,
    pub user: User,
}

// ── Leads ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lead {
    pub id: i64,
    pub organisation_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub age: i64,
    pub description: String,
    pub phone_number: String,
    pub email: String,
    pub agent_id: Option<i64>,
    pub category_id: Option<i64>,
    pub date_added: String,
    pub converted_date: Option<String>,
}

impl Lead {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Writable lead fields, shared by create and update. Organisation is
/// deliberately absent: it is fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadFields {
    pub first_name: String,
    pub last_name: String,
    pub age: i64,
    pub description: String,
    pub phone_number: String,
    pub email: String,
    pub agent_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub organisation_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FollowUp {
    pub id: i64,
    pub lead_id: i64,
    pub author_id: Option<i64>,
    pub notes: String,
    pub date_added: String,
}

/// Lead detail: the lead with its resolved relations and notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadDetail {
    pub lead: Lead,
    pub agent: Option<Agent>,
    pub category: Option<Category>,
    pub followups: Vec<FollowUp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDetail {
    pub category: Category,
    pub leads: Vec<Lead>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryListing {
    pub categories: Vec<Category>,
    pub unassigned_lead_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardStats {
    pub total_lead_count: i64,
    pub total_in_past30: i64,
    pub converted_in_past30: i64,
}

// ── Lead list query ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeadSort {
    DateAsc,
    DateDesc,
    FirstAsc,
    FirstDesc,
}

impl LeadSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DateAsc => "date_asc",
            Self::DateDesc => "date_desc",
            Self::FirstAsc => "first_asc",
            Self::FirstDesc => "first_desc",
        }
    }

    /// ORDER BY clause; `id` breaks ties so the sequence is stable.
    pub fn order_by(sort: Option<LeadSort>) -> &'static str {
        match sort {
            Some(Self::DateAsc) => "l.date_added ASC, l.id ASC",
            Some(Self::DateDesc) => "l.date_added DESC, l.id DESC",
            Some(Self::FirstAsc) => "l.first_name ASC, l.id ASC",
            Some(Self::FirstDesc) => "l.first_name DESC, l.id DESC",
            None => "l.id ASC",
        }
    }
}

impl FromStr for LeadSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date_asc" => Ok(Self::DateAsc),
            "date_desc" => Ok(Self::DateDesc),
            "first_asc" => Ok(Self::FirstAsc),
            "first_desc" => Ok(Self::FirstDesc),
            _ => Err(format!("Invalid sort: {}", s)),
        }
    }
}

/// Search, filter and sort applied on top of the role scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadFilter {
    pub q: Option<String>,
    pub agent_id: Option<i64>,
    pub category_id: Option<i64>,
    pub sort: Option<LeadSort>,
}

// ── Notifications ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub url: Option<String>,
    pub read: bool,
    pub created_at: String,
}

/// One entry of the polling feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedItem {
    pub id: i64,
    pub message: String,
    pub url: String,
    pub created_at: String,
    pub read: bool,
}

impl From<Notification> for FeedItem {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            message: n.message,
            url: n.url.unwrap_or_default(),
            created_at: n.created_at,
            read: n.read,
        }
    }
}
