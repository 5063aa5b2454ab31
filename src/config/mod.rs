//! Daemon settings
//!
//! Read from `config.yml`, then overridden by `CARNET_*` environment
//! variables. Every section and field has a default, so an absent file is a
//! valid configuration.

use serde::{Deserialize, Serialize};

/// Root of `config.yml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Scheduled publication sweep configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Outgoing mail configuration
    #[serde(default)]
    pub mail: MailConfig,
    /// Site-wide presentation settings
    #[serde(default)]
    pub site: SiteConfig,
}

/// Where posts, users and codes are stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// File path or `sqlite:` URL for SQLite, `mysql://` URL for MySQL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/carnet.db".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Scheduled publication sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Run the sweep in the background while the daemon is up
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    /// Seconds between two sweeps
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            interval_seconds: default_interval_seconds(),
        }
    }
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_interval_seconds() -> u64 {
    60
}

/// SMTP configuration for verification emails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// When disabled, messages are written to the log instead of sent
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    /// Sender address; falls back to the SMTP username when empty
    #[serde(default)]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: String::new(),
            from_name: default_from_name(),
        }
    }
}

impl MailConfig {
    /// Address used in the `From` header
    pub fn sender_address(&self) -> &str {
        if self.from_address.is_empty() {
            &self.smtp_username
        } else {
            &self.from_address
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Carnet".to_string()
}

/// Site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site name, used in outgoing mail
    #[serde(default = "default_site_name")]
    pub name: String,
    /// Page size of the post index
    #[serde(default = "default_posts_per_page")]
    pub posts_per_page: u32,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            posts_per_page: default_posts_per_page(),
        }
    }
}

fn default_site_name() -> String {
    "Carnet".to_string()
}

fn default_posts_per_page() -> u32 {
    10
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Parse `path`, or fall back to defaults when it is missing or blank.
    ///
    /// Malformed YAML is an error carrying the line and column.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// [`Config::load`], then environment overrides, then [`Config::validate`].
    ///
    /// Recognised variables:
    /// - CARNET_DATABASE_DRIVER
    /// - CARNET_DATABASE_URL
    /// - CARNET_SCHEDULER_ENABLED
    /// - CARNET_SCHEDULER_INTERVAL_SECONDS
    /// - CARNET_MAIL_ENABLED
    /// - CARNET_MAIL_SMTP_HOST
    /// - CARNET_MAIL_SMTP_PORT
    /// - CARNET_MAIL_SMTP_USERNAME
    /// - CARNET_MAIL_SMTP_PASSWORD
    /// - CARNET_MAIL_FROM_ADDRESS
    /// - CARNET_SITE_NAME
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the daemon misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.interval_seconds must be greater than 0".to_string(),
            ));
        }
        if self.site.posts_per_page == 0 {
            return Err(ConfigError::ValidationError(
                "site.posts_per_page must be greater than 0".to_string(),
            ));
        }
        if self.mail.enabled && self.mail.smtp_host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "mail.smtp_host is required when mail is enabled".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        // Database configuration
        if let Ok(driver) = std::env::var("CARNET_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("CARNET_DATABASE_URL") {
            self.database.url = url;
        }

        // Scheduler configuration
        if let Some(enabled) = env_bool("CARNET_SCHEDULER_ENABLED") {
            self.scheduler.enabled = enabled;
        }
        if let Ok(interval) = std::env::var("CARNET_SCHEDULER_INTERVAL_SECONDS") {
            if let Ok(interval) = interval.parse::<u64>() {
                self.scheduler.interval_seconds = interval;
            }
        }

        // Mail configuration
        if let Some(enabled) = env_bool("CARNET_MAIL_ENABLED") {
            self.mail.enabled = enabled;
        }
        if let Ok(host) = std::env::var("CARNET_MAIL_SMTP_HOST") {
            self.mail.smtp_host = host;
        }
        if let Ok(port) = std::env::var("CARNET_MAIL_SMTP_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.mail.smtp_port = port;
            }
        }
        if let Ok(username) = std::env::var("CARNET_MAIL_SMTP_USERNAME") {
            self.mail.smtp_username = username;
        }
        if let Ok(password) = std::env::var("CARNET_MAIL_SMTP_PASSWORD") {
            self.mail.smtp_password = password;
        }
        if let Ok(from) = std::env::var("CARNET_MAIL_FROM_ADDRESS") {
            self.mail.from_address = from;
        }

        // Site configuration
        if let Ok(name) = std::env::var("CARNET_SITE_NAME") {
            self.site.name = name;
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    match std::env::var(key).ok()?.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by `tests` and `property_tests`, both of which touch the environment.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "CARNET_DATABASE_DRIVER",
    "CARNET_DATABASE_URL",
    "CARNET_SCHEDULER_ENABLED",
    "CARNET_SCHEDULER_INTERVAL_SECONDS",
    "CARNET_MAIL_ENABLED",
    "CARNET_MAIL_SMTP_HOST",
    "CARNET_MAIL_SMTP_PORT",
    "CARNET_MAIL_SMTP_USERNAME",
    "CARNET_MAIL_SMTP_PASSWORD",
    "CARNET_MAIL_FROM_ADDRESS",
    "CARNET_SITE_NAME",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    proptest! {
        #[test]
        fn interval_roundtrips_through_yaml(interval in 1u64..86_400) {
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "scheduler:\n  interval_seconds: {}\n", interval).unwrap();

            let config = Config::load(file.path()).unwrap();
            prop_assert_eq!(config.scheduler.interval_seconds, interval);
        }

        #[test]
        fn env_interval_override_wins(interval in 1u64..86_400) {
            let _guard = super::CONFIG_ENV_MUTEX
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            super::clear_env();

            let file = NamedTempFile::new().unwrap();
            std::env::set_var("CARNET_SCHEDULER_INTERVAL_SECONDS", interval.to_string());

            let config = Config::load_with_env(file.path()).unwrap();
            super::clear_env();

            prop_assert_eq!(config.scheduler.interval_seconds, interval);
        }
    }
}
