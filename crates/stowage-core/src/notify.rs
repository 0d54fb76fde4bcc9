use std::fmt;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{error, info};

use crate::error::NotifyError;

/// Final status of one fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Succeeded => f.write_str("Succeeded"),
            RunStatus::Failed => f.write_str("Failed"),
        }
    }
}

/// Delivers one plain-text message.
pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

#[derive(Clone)]
pub struct MailSettings {
    pub relay: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: Mailbox,
    pub timeout: Duration,
}

impl fmt::Debug for MailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailSettings")
            .field("relay", &self.relay)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse::<Mailbox>().map_err(|e| NotifyError::Address {
        address: address.to_string(),
        message: e.to_string(),
    })
}

/// SMTP with implicit TLS (SMTPS) and username/password authentication.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &MailSettings) -> Result<Self, NotifyError> {
        let transport = SmtpTransport::relay(&settings.relay)
            .map_err(|e| NotifyError::Transport(format!("relay '{}': {e}", settings.relay)))?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(settings.timeout))
            .build();
        Ok(Self {
            transport,
            from: settings.from.clone(),
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(to)?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotifyError::Message(e.to_string()))?;
        self.transport
            .send(&message)
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(())
    }
}

/// Sends the per-fire status email. Delivery failures are logged and
/// absorbed; they never reach the scheduler.
pub struct Notifier {
    mailer: Box<dyn Mailer>,
}

impl Notifier {
    pub fn new(mailer: Box<dyn Mailer>) -> Self {
        Self { mailer }
    }

    pub fn notify(&self, status: RunStatus, subject: &str, body: &str, to: &str) {
        match self.mailer.send(to, subject, body) {
            Ok(()) => info!(%status, to, "notification sent"),
            Err(e) => error!(%status, to, error = %e, "notification failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    struct Flaky {
        attempts: Arc<Mutex<u32>>,
    }

    impl Mailer for Flaky {
        fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
            *self.attempts.lock().unwrap() += 1;
            Err(NotifyError::Transport("connection refused".into()))
        }
    }

    #[test]
    fn mailer_errors_are_absorbed() {
        let attempts = Arc::new(Mutex::new(0));
        let notifier = Notifier::new(Box::new(Flaky {
            attempts: attempts.clone(),
        }));
        notifier.notify(RunStatus::Failed, "Backup Failed", "body", "ops@example.com");
        assert_eq!(*attempts.lock().unwrap(), 1);
    }

    #[test]
    fn mailbox_parsing() {
        assert!(parse_mailbox("ops@example.com").is_ok());
        assert!(parse_mailbox("Ops Team <ops@example.com>").is_ok());
        let err = parse_mailbox("not an address").unwrap_err();
        assert!(matches!(err, NotifyError::Address { .. }));
    }

    #[test]
    fn status_display() {
        assert_eq!(RunStatus::Succeeded.to_string(), "Succeeded");
        assert_eq!(RunStatus::Failed.to_string(), "Failed");
    }

    #[test]
    fn smtp_mailer_builds_without_connecting() {
        let settings = MailSettings {
            relay: "smtp.example.com".into(),
            port: 465,
            username: "sender@example.com".into(),
            password: "hunter2".into(),
            from: parse_mailbox("sender@example.com").unwrap(),
            timeout: Duration::from_secs(5),
        };
        assert!(SmtpMailer::new(&settings).is_ok());
    }
}
