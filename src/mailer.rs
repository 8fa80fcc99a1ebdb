use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use log::{info, warn};
use rand::Rng;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// A plain-text notification
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn new(to: &str, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Email {
            to: to.to_string(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("bad address '{0}'")]
    Address(String),

    #[error("could not build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("outbox lock poisoned")]
    Poisoned,
}

pub trait Mailer: Send + Sync {
    fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// SMTP connection settings
#[derive(Clone, Debug)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub sender: String,
}

pub struct SmtpMailer {
    smtp: SmtpTransport,
    sender: String,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self, MailError> {
        let creds = Credentials::new(settings.user.clone(), settings.password.clone());
        let tls_parameters = TlsParameters::new(settings.host.clone())?;

        let smtp = SmtpTransport::relay(&settings.host)?
            .credentials(creds)
            .port(settings.port)
            .tls(Tls::Wrapper(tls_parameters))
            .build();

        Ok(SmtpMailer {
            smtp,
            sender: settings.sender.clone(),
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, email: &Email) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.sender.parse().map_err(|_| MailError::Address(self.sender.clone()))?)
            .to(email.to.parse().map_err(|_| MailError::Address(email.to.clone()))?)
            .subject(email.subject.as_str())
            .body(email.body.clone())?;

        self.smtp.send(&message)?;
        Ok(())
    }
}

/// Mailer that only logs and remembers what it was asked to send
#[derive(Default)]
pub struct OutboxMailer {
    sent: Mutex<Vec<Email>>,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Mailer for OutboxMailer {
    fn send(&self, email: &Email) -> Result<(), MailError> {
        info!("mail to {}: {}", email.to, email.subject);
        self.sent.lock().map_err(|_| MailError::Poisoned)?.push(email.clone());
        Ok(())
    }
}

/// Send each email in turn, pausing `delay` between sends. Failures do not
/// stop the batch; each one comes back as a warning line.
pub fn deliver_all(mailer: &dyn Mailer, emails: &[Email], delay: Duration) -> Vec<String> {
    let mut warnings = Vec::new();
    for (i, email) in emails.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            thread::sleep(delay);
        }
        if let Err(e) = mailer.send(email) {
            warn!("sending '{}' to {} failed: {}", email.subject, email.to, e);
            warnings.push(format!("Email to {} could not be sent.", email.to));
        }
    }
    warnings
}

/// Random temporary password for new accounts
pub fn generate_password() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";
    let mut rng = rand::thread_rng();

    (0..12)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}
