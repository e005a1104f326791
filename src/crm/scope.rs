//! Per-request query scoping.
//!
//! An organisor sees every record of their organisation. An agent sees the
//! records of their organisation that are assigned to them. A user that is
//! neither sees nothing.

use rusqlite::types::Value;
use serde::Serialize;

use crate::errors::CrmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Organisor,
    Agent,
    Unaffiliated,
}

/// The authenticated caller, resolved once per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Viewer {
    pub user_id: i64,
    pub role: Role,
    pub organisation_id: Option<i64>,
    /// Set when the caller has an agent record.
    pub agent_id: Option<i64>,
    pub is_superuser: bool,
}

impl Viewer {
    pub fn is_organisor(&self) -> bool {
        self.role == Role::Organisor
    }

    /// Organisation of an organisor, or `Forbidden` for anyone else.
    pub fn require_organisor(&self) -> Result<i64, CrmError> {
        match (self.role, self.organisation_id) {
            (Role::Organisor, Some(org)) => Ok(org),
            _ => Err(CrmError::Forbidden(
                "This action is reserved for organisors".to_string(),
            )),
        }
    }

    /// Organisation the caller works in, for any affiliated role.
    pub fn organisation(&self) -> Option<i64> {
        match self.role {
            Role::Unaffiliated => None,
            _ => self.organisation_id,
        }
    }

    pub fn lead_scope(&self) -> LeadScope {
        match (self.role, self.organisation_id, self.agent_id) {
            (Role::Organisor, Some(org), _) => LeadScope::Organisation(org),
            (Role::Agent, Some(org), Some(agent)) => LeadScope::Assigned {
                organisation_id: org,
                agent_id: agent,
            },
            _ => LeadScope::Nothing,
        }
    }
}

/// SQL restriction on the `leads` table (aliased `l`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadScope {
    Organisation(i64),
    Assigned { organisation_id: i64, agent_id: i64 },
    Nothing,
}

impl LeadScope {
    /// WHERE fragment and its positional parameters.
    pub fn sql(&self) -> (&'static str, Vec<Value>) {
        match *self {
            Self::Organisation(org) => ("l.organisation_id = ?", vec![Value::Integer(org)]),
            Self::Assigned {
                organisation_id,
                agent_id,
            } => (
                "l.organisation_id = ? AND l.agent_id = ?",
                vec![Value::Integer(organisation_id), Value::Integer(agent_id)],
            ),
            Self::Nothing => ("0", Vec::new()),
        }
    }

    pub fn organisation(&self) -> Option<i64> {
        match *self {
            Self::Organisation(org) => Some(org),
            Self::Assigned {
                organisation_id, ..
            } => Some(organisation_id),
            Self::Nothing => None,
        }
    }
}
