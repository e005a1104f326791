//! Outbound email.
//!
//! Sending is synchronous; callers run it on the blocking pool. Without an
//! SMTP host configured, mail is only logged.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use lettre::message::{Message, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use tracing::info;

use crate::config::MailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub trait Mailer: Send + Sync {
    fn send(&self, mail: &OutboundMail) -> Result<()>;
}

/// Build the mailer described by the config.
pub fn from_config(config: &MailConfig) -> Arc<dyn Mailer> {
    match &config.smtp_host {
        Some(host) => Arc::new(SmtpMailer::new(config, host)),
        None => Arc::new(LogMailer {
            from: config.from.clone(),
        }),
    }
}

pub struct SmtpMailer {
    transport: SmtpTransport,
    from: String,
}

impl SmtpMailer {
    fn new(config: &MailConfig, host: &str) -> Self {
        let mut builder = SmtpTransport::builder_dangerous(host).port(config.smtp_port);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Self {
            transport: builder.build(),
            from: config.from.clone(),
        }
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, mail: &OutboundMail) -> Result<()> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .with_context(|| format!("Invalid from address: {}", self.from))?,
            )
            .to(mail
                .to
                .parse()
                .with_context(|| format!("Invalid to address: {}", mail.to))?)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())
            .context("Failed to build email")?;
        self.transport
            .send(&message)
            .map_err(|e| anyhow!("Failed to send email to {}: {}", mail.to, e))?;
        info!(to = %mail.to, subject = %mail.subject, "Email sent");
        Ok(())
    }
}

/// Writes mail to the log instead of delivering it.
pub struct LogMailer {
    from: String,
}

impl Mailer for LogMailer {
    fn send(&self, mail: &OutboundMail) -> Result<()> {
        info!(
            from = %self.from,
            to = %mail.to,
            subject = %mail.subject,
            "SMTP not configured, email not delivered"
        );
        Ok(())
    }
}

/// Keeps sent mail in memory.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutboundMail>>,
    fail: bool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, mail: &OutboundMail) -> Result<()> {
        if self.fail {
            return Err(anyhow!("mail transport unavailable"));
        }
        self.sent
            .lock()
            .map_err(|_| anyhow!("mailer lock poisoned"))?
            .push(mail.clone());
        Ok(())
    }
}

pub fn agent_invitation(to: &str, username: &str) -> OutboundMail {
    OutboundMail {
        to: to.to_string(),
        subject: "You are invited to be an agent".to_string(),
        body: format!(
            "You were added as an agent on the CRM. Log in as '{}' to start working.",
            username
        ),
    }
}

pub fn lead_created(to: &str, lead_name: &str) -> OutboundMail {
    OutboundMail {
        to: to.to_string(),
        subject: "A lead has been created".to_string(),
        body: format!("{} was added as a new lead.", lead_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_mailer_records() -> Result<()> {
        let mailer = MemoryMailer::new();
        mailer.send(&agent_invitation("ana@example.com", "ana"))?;
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ana@example.com");
        assert!(sent[0].body.contains("'ana'"));
        Ok(())
    }

    #[test]
    fn test_failing_mailer_errors() {
        let mailer = MemoryMailer::failing();
        assert!(mailer.send(&lead_created("x@example.com", "Arta Doe")).is_err());
        assert!(mailer.sent().is_empty());
    }

    #[test]
    fn test_log_mailer_without_smtp_host() -> Result<()> {
        let mailer = from_config(&MailConfig::default());
        mailer.send(&lead_created("x@example.com", "Arta Doe"))
    }

    #[test]
    fn test_smtp_mailer_rejects_bad_address() {
        let config = MailConfig {
            smtp_host: Some("127.0.0.1".into()),
            ..MailConfig::default()
        };
        let mailer = from_config(&config);
        let mail = OutboundMail {
            to: "not an address".into(),
            subject: "s".into(),
            body: "b".into(),
        };
        assert!(mailer.send(&mail).is_err());
    }
}
