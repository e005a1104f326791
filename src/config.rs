//! Layered configuration for the CRM server.
//!
//! Values are resolved in order, later layers winning:
//! built-in defaults → `crm.toml` → `CRM_*` environment variables → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8000
//! dev_mode = false
//!
//! [database]
//! path = ".leadcrm/crm.db"
//!
//! [session]
//! cookie_name = "crm_session"
//! ttl_hours = 336
//!
//! [mail]
//! smtp_host = "localhost"
//! smtp_port = 25
//! from = "admin@test.com"
//! lead_created_recipient = "test2@test.com"
//!
//! [intake]
//! owner_username = "admin"
//!
//! [logging]
//! level = "info"
//! json = false
//! dir = ".leadcrm/logs"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default file name looked up in the working directory.
pub const CONFIG_FILE: &str = "crm.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for a locally served front-end.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".leadcrm/crm.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Two weeks, the usual web-framework session age.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,
}

fn default_cookie_name() -> String {
    "crm_session".to_string()
}

fn default_ttl_hours() -> i64 {
    24 * 14
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

/// Outbound mail. Without `smtp_host` mail is only logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_from")]
    pub from: String,
    #[serde(default = "default_lead_created_recipient")]
    pub lead_created_recipient: String,
}

fn default_smtp_port() -> u16 {
    25
}

fn default_from() -> String {
    "admin@test.com".to_string()
}

fn default_lead_created_recipient() -> String {
    "test2@test.com".to_string()
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            username: None,
            password: None,
            from: default_from(),
            lead_created_recipient: default_lead_created_recipient(),
        }
    }
}

/// Where leads submitted through the public form land.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    #[serde(default = "default_owner_username")]
    pub owner_username: String,
}

fn default_owner_username() -> String {
    "admin".to_string()
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            owner_username: default_owner_username(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Daily rolling log files go here when set.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CrmConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse crm.toml")
    }

    /// Load `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// File layer plus the process environment.
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `CRM_*` overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CRM_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("CRM_PORT") {
            self.server.port = v
                .parse()
                .with_context(|| format!("CRM_PORT is not a port number: '{}'", v))?;
        }
        if let Some(v) = lookup("CRM_DEV_MODE") {
            self.server.dev_mode = v != "false" && v != "0";
        }
        if let Some(v) = lookup("CRM_DB_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CRM_SESSION_TTL_HOURS") {
            self.session.ttl_hours = v
                .parse()
                .with_context(|| format!("CRM_SESSION_TTL_HOURS is not a number: '{}'", v))?;
        }
        if let Some(v) = lookup("CRM_SMTP_HOST") {
            self.mail.smtp_host = Some(v);
        }
        if let Some(v) = lookup("CRM_SMTP_PORT") {
            self.mail.smtp_port = v
                .parse()
                .with_context(|| format!("CRM_SMTP_PORT is not a port number: '{}'", v))?;
        }
        if let Some(v) = lookup("CRM_SMTP_USERNAME") {
            self.mail.username = Some(v);
        }
        if let Some(v) = lookup("CRM_SMTP_PASSWORD") {
            self.mail.password = Some(v);
        }
        if let Some(v) = lookup("CRM_MAIL_FROM") {
            self.mail.from = v;
        }
        if let Some(v) = lookup("CRM_INTAKE_OWNER") {
            self.intake.owner_username = v;
        }
        if let Some(v) = lookup("CRM_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("CRM_LOG_JSON") {
            self.logging.json = v != "false" && v != "0";
        }
        Ok(())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize crm.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CrmConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.database.path, PathBuf::from(".leadcrm/crm.db"));
        assert_eq!(config.session.cookie_name, "crm_session");
        assert_eq!(config.session.ttl_hours, 336);
        assert!(config.mail.smtp_host.is_none());
        assert_eq!(config.intake.owner_username, "admin");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() -> Result<()> {
        let config = CrmConfig::parse(
            r#"
            [server]
            port = 9100

            [intake]
            owner_username = "boss"
            "#,
        )?;
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.intake.owner_username, "boss");
        assert_eq!(config.mail.from, "admin@test.com");
        Ok(())
    }

    #[test]
    fn test_parse_rejects_bad_toml() {
        assert!(CrmConfig::parse("[server\nport = 1").is_err());
    }

    #[test]
    fn test_env_overrides_file() -> Result<()> {
        let mut config = CrmConfig::parse("[server]\nport = 9100\n")?;
        config.apply_env(env(&[
            ("CRM_PORT", "9200"),
            ("CRM_SMTP_HOST", "mail.local"),
            ("CRM_LOG_JSON", "1"),
        ]))?;
        assert_eq!(config.server.port, 9200);
        assert_eq!(config.mail.smtp_host.as_deref(), Some("mail.local"));
        assert!(config.logging.json);
        Ok(())
    }

    #[test]
    fn test_env_rejects_bad_port() {
        let mut config = CrmConfig::default();
        let result = config.apply_env(env(&[("CRM_PORT", "eighty")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() -> Result<()> {
        let dir = TempDir::new()?;
        let config = CrmConfig::load_or_default(&dir.path().join(CONFIG_FILE))?;
        assert_eq!(config.server.port, 8000);
        Ok(())
    }

    #[test]
    fn test_save_and_load_roundtrip() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(CONFIG_FILE);
        let mut config = CrmConfig::default();
        config.mail.lead_created_recipient = "sales@example.com".to_string();
        config.save(&path)?;

        let loaded = CrmConfig::load(&path)?;
        assert_eq!(loaded.mail.lead_created_recipient, "sales@example.com");
        Ok(())
    }

    #[test]
    fn test_bind_addr() {
        let config = CrmConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:8000");
    }
}
