//! Typed error hierarchy for the CRM.
//!
//! `CrmError` is what database closures and domain operations return. The
//! HTTP layer turns it into a response in `crm::api::ApiError`.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

/// Field name → messages, in a stable order for rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors that belong to the form as a whole rather than one field.
    pub const NON_FIELD: &'static str = "__all__";

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// `Ok(())` when nothing was recorded, otherwise the collected errors.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<&str> = self.0.keys().map(String::as_str).collect();
        write!(f, "{}", fields.join(", "))
    }
}

/// Which list view a "not found" falls back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Lead,
    Agent,
    Category,
    FollowUp,
    Notification,
    User,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Agent => "agent",
            Self::Category => "category",
            Self::FollowUp => "follow-up",
            Self::Notification => "notification",
            Self::User => "user",
        }
    }
}

/// Errors from the CRM domain and database layer.
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("Invalid input in: {0}")]
    Validation(FieldErrors),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{} {id} not found", .entity.as_str())]
    NotFound { entity: Entity, id: i64 },

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrmError {
    pub fn not_found(entity: Entity, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }
}

impl From<FieldErrors> for CrmError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<rusqlite::Error> for CrmError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Other(anyhow::Error::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_collect_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("email", "This field is required.");
        errors.add("email", "Enter a valid email address.");
        errors.add("first_name", "This field is required.");
        assert_eq!(errors.get("email").map(|m| m.len()), Some(2));
        assert!(errors.contains("first_name"));
        assert!(!errors.contains("last_name"));
        assert_eq!(errors.to_string(), "email, first_name");
    }

    #[test]
    fn empty_field_errors_into_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
        assert!(FieldErrors::single("x", "bad").into_result().is_err());
    }

    #[test]
    fn field_errors_serialize_as_map() {
        let errors = FieldErrors::single("email", "required");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, serde_json::json!({"email": ["required"]}));
    }

    #[test]
    fn not_found_carries_entity_and_id() {
        let err = CrmError::not_found(Entity::Lead, 42);
        match &err {
            CrmError::NotFound { entity, id } => {
                assert_eq!(*entity, Entity::Lead);
                assert_eq!(*id, 42);
            }
            _ => panic!("Expected NotFound"),
        }
        assert_eq!(err.to_string(), "lead 42 not found");
    }

    #[test]
    fn field_errors_convert_into_validation() {
        let err: CrmError = FieldErrors::single("agent", "Select a valid choice.").into();
        assert!(matches!(err, CrmError::Validation(_)));
    }

    #[test]
    fn crm_error_implements_std_error() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&CrmError::LockPoisoned);
        assert_std_error(&CrmError::Forbidden("no".into()));
    }
}
