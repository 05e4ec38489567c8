use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Calendar whose next event names the person on duty
    #[serde(alias = "CalendarId")]
    pub calendar_id: String,

    /// Address the HTTP server binds to
    #[serde(default = "default_server_host", alias = "ServerHost")]
    pub server_host: String,

    #[serde(default = "default_server_port", alias = "ServerPort")]
    pub server_port: u16,

    /// Path to the Google OAuth client secret JSON file
    #[serde(default = "default_client_secret_path")]
    pub client_secret_path: PathBuf,

    /// Where the OAuth token is cached. Defaults to ~/.credentials/duty-gateway.json
    #[serde(default)]
    pub token_cache_path: Option<PathBuf>,

    #[serde(default)]
    pub mail: MailConfig,
}

/// Settings for the unread-mail drain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Number of workers marking messages as read
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pause between two fetch cycles (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Messages buffered between the fetcher and the workers
    #[serde(default)]
    pub channel_capacity: Option<usize>,

    /// Deadline for each call to the mail service (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_secs: default_poll_interval(),
            channel_capacity: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl MailConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity.unwrap_or(self.workers).max(1)
    }
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_client_secret_path() -> PathBuf {
    PathBuf::from("client_secret.json")
}

fn default_workers() -> usize {
    4
}

fn default_poll_interval() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.calendar_id.trim().is_empty() {
            return Err(ConfigError::Invalid("calendar_id must not be empty".into()));
        }
        if self.mail.workers == 0 {
            return Err(ConfigError::Invalid("mail.workers must be at least 1".into()));
        }
        if self.mail.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "mail.poll_interval_secs must be at least 1".into(),
            ));
        }
        if self.mail.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "mail.request_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config: Config = toml::from_str(r#"calendar_id = "duty@group.calendar.google.com""#)
            .expect("should parse");

        assert_eq!(config.server_host, "127.0.0.1");
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.client_secret_path, PathBuf::from("client_secret.json"));
        assert!(config.token_cache_path.is_none());
        assert_eq!(config.mail.workers, 4);
        assert_eq!(config.mail.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.mail.channel_capacity(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_legacy_keys_accepted() {
        let config: Config = toml::from_str(
            r#"
            CalendarId = "team"
            ServerHost = "0.0.0.0"
            ServerPort = 9000
            "#,
        )
        .expect("should parse");

        assert_eq!(config.calendar_id, "team");
        assert_eq!(config.bind_address(), "0.0.0.0:9000");
    }

    #[test]
    fn test_mail_section() {
        let config: Config = toml::from_str(
            r#"
            calendar_id = "team"

            [mail]
            workers = 8
            poll_interval_secs = 60
            channel_capacity = 32
            "#,
        )
        .expect("should parse");

        assert_eq!(config.mail.workers, 8);
        assert_eq!(config.mail.channel_capacity(), 32);
        assert_eq!(config.mail.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config: Config = toml::from_str(r#"calendar_id = " ""#).expect("should parse");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.calendar_id = "team".to_string();
        config.mail.workers = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "calendar_id = \"team\"\nserver_port = 8181\n").unwrap();

        let config = Config::load(&path).expect("should load");
        assert_eq!(config.server_port, 8181);

        let missing = Config::load(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
