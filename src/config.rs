//! Configuration management

use anyhow::{self, Context, Result};

use crate::services::directory::{DirectoryBackend, DirectoryConfig};
use crate::types::ContactTypeTable;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// Optional NATS credentials
    pub nats_user: Option<String>,
    pub nats_password: Option<String>,

    /// Which directory implementation to talk to
    pub directory_backend: DirectoryBackend,

    /// Directory gateway settings (URL, tenant, token, timeout)
    pub directory: DirectoryConfig,

    /// Preferred contact type name -> id table
    pub contact_types: ContactTypeTable,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let nats_url = var("NATS_URL").unwrap_or_else(|| "nats://localhost:4222".to_string());
        let nats_user = var("NATS_USER");
        let nats_password = var("NATS_PASSWORD");

        let directory_backend = match var("DIRECTORY_BACKEND") {
            Some(raw) => DirectoryBackend::parse(&raw)
                .with_context(|| format!("DIRECTORY_BACKEND must be 'http' or 'mock', got '{}'", raw))?,
            None => DirectoryBackend::Http,
        };

        let base_url = match (var("DIRECTORY_URL"), directory_backend) {
            (Some(url), _) => url,
            (None, DirectoryBackend::Mock) => DirectoryConfig::default().base_url,
            (None, DirectoryBackend::Http) => {
                anyhow::bail!("DIRECTORY_URL must be set unless DIRECTORY_BACKEND=mock")
            }
        };
        let tenant = var("DIRECTORY_TENANT").unwrap_or_else(|| "diku".to_string());

        let mut directory = DirectoryConfig::new(base_url, tenant);
        directory.token = var("DIRECTORY_TOKEN");
        if let Some(raw) = var("DIRECTORY_TIMEOUT_SECS") {
            directory.timeout_seconds = raw
                .trim()
                .parse()
                .with_context(|| format!("DIRECTORY_TIMEOUT_SECS must be a number of seconds, got '{}'", raw))?;
        }

        let contact_types = match var("PREFERRED_CONTACT_TYPES") {
            Some(raw) => ContactTypeTable::parse(&raw)
                .with_context(|| format!("PREFERRED_CONTACT_TYPES must look like 'name=id,name=id', got '{}'", raw))?,
            None => ContactTypeTable::default(),
        };

        Ok(Self {
            nats_url,
            nats_user,
            nats_password,
            directory_backend,
            directory,
            contact_types,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_config_defaults() {
        let config = config(&[("DIRECTORY_URL", "http://okapi:9130/")]).unwrap();
        assert_eq!(config.nats_url, "nats://localhost:4222");
        assert_eq!(config.directory_backend, DirectoryBackend::Http);
        assert_eq!(config.directory.base_url, "http://okapi:9130");
        assert_eq!(config.directory.tenant, "diku");
        assert_eq!(config.directory.timeout_seconds, 30);
        assert!(config.directory.token.is_none());
        assert_eq!(config.contact_types.resolve("email"), Some("002"));
    }

    #[test]
    fn test_config_requires_directory_url_for_http() {
        let err = config(&[]).unwrap_err();
        assert!(err.to_string().contains("DIRECTORY_URL"));
    }

    #[test]
    fn test_config_mock_backend_needs_no_url() {
        let config = config(&[("DIRECTORY_BACKEND", "mock")]).unwrap();
        assert_eq!(config.directory_backend, DirectoryBackend::Mock);
    }

    #[test]
    fn test_config_reads_overrides() {
        let config = config(&[
            ("DIRECTORY_URL", "http://okapi:9130"),
            ("DIRECTORY_TENANT", "university"),
            ("DIRECTORY_TOKEN", "secret"),
            ("DIRECTORY_TIMEOUT_SECS", "5"),
            ("NATS_USER", "worker"),
            ("NATS_PASSWORD", "pw"),
            ("PREFERRED_CONTACT_TYPES", "email=100,sms=200"),
        ])
        .unwrap();
        assert_eq!(config.directory.tenant, "university");
        assert_eq!(config.directory.token.as_deref(), Some("secret"));
        assert_eq!(config.directory.timeout_seconds, 5);
        assert_eq!(config.nats_user.as_deref(), Some("worker"));
        assert_eq!(config.contact_types.resolve("sms"), Some("200"));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(config(&[("DIRECTORY_BACKEND", "ldap")]).is_err());
        assert!(config(&[("DIRECTORY_URL", "http://x"), ("DIRECTORY_TIMEOUT_SECS", "soon")]).is_err());
        assert!(config(&[("DIRECTORY_URL", "http://x"), ("PREFERRED_CONTACT_TYPES", "email")]).is_err());
    }

    #[test]
    #[ignore] // requires --test-threads=1 due to env var race
    fn test_config_from_env_reads_process_environment() {
        std::env::set_var("DIRECTORY_BACKEND", "mock");
        let config = Config::from_env().unwrap();
        assert_eq!(config.directory_backend, DirectoryBackend::Mock);
        std::env::remove_var("DIRECTORY_BACKEND");
    }
}
