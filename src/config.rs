use log::{info, warn};
use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

use crate::mailer::SmtpSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("{0} must be 'local' or 'memory'")]
    StoreKind(String),
}

/// Which sheet store backs the service
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Local,
    Memory,
}

impl FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StoreKind::Local),
            "memory" => Ok(StoreKind::Memory),
            other => Err(ConfigError::StoreKind(other.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind: String,
    pub data_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub users_file: PathBuf,
    pub routing_file: PathBuf,
    pub availability_file: PathBuf,
    pub store: StoreKind,
    pub cache_ttl: Duration,
    pub email_delay: Duration,
    /// Prefix for links in emails and uploaded-file URLs
    pub public_url: String,
    /// Where requesters are told to reply
    pub contact_email: Option<String>,
    /// `None` sends mail to the logging outbox
    pub smtp: Option<SmtpSettings>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let bind: String = try_load("TAP_BIND", "127.0.0.1:3000")?;
        let public_url = var("TAP_PUBLIC_URL").unwrap_or_else(|| format!("http://{}", bind));

        Ok(Self {
            data_dir: try_load("TAP_DATA_DIR", "database")?,
            upload_dir: try_load("TAP_UPLOAD_DIR", "uploads")?,
            users_file: try_load("TAP_USERS_FILE", "database/users.json")?,
            routing_file: try_load("TAP_ROUTING_FILE", "config/travel_routing.json")?,
            availability_file: try_load("TAP_AVAILABILITY_FILE", "config/ga_availability.json")?,
            store: try_load("TAP_STORE", "local")?,
            cache_ttl: Duration::from_secs(try_load("TAP_CACHE_TTL_SECS", "60")?),
            email_delay: Duration::from_millis(try_load("TAP_EMAIL_DELAY_MS", "500")?),
            public_url: public_url.trim_end_matches('/').to_string(),
            contact_email: var("TAP_CONTACT_EMAIL"),
            smtp: load_smtp()?,
            bind,
        })
    }
}

fn load_smtp() -> Result<Option<SmtpSettings>, ConfigError> {
    let Some(host) = var("SMTP_HOST") else {
        info!("SMTP_HOST not set, outgoing mail will only be logged");
        return Ok(None);
    };
    let user = var("SMTP_USER").unwrap_or_default();
    let sender = var("SMTP_SENDER").unwrap_or_else(|| user.clone());
    Ok(Some(SmtpSettings {
        port: try_load("SMTP_PORT", "465")?,
        password: read_secret("SMTP_PASSWORD").unwrap_or_default(),
        host,
        user,
        sender,
    }))
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key: key.to_string(),
                message: e.to_string(),
            }
        })
}

/// Secret from the environment, else from `/run/secrets/<name>`
fn read_secret(secret_name: &str) -> Option<String> {
    if let Some(value) = var(secret_name) {
        return Some(value);
    }
    let path = format!("/run/secrets/{secret_name}");
    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .ok()
}
