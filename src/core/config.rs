//! Configuration loading
//!
//! Configuration is a YAML document. `Config::load()` looks in this order:
//! 1. the file named by `$SUBDESK_CONFIG`
//! 2. `config.yaml` in the per-user config directory
//! 3. built-in defaults
//!
//! Registry credentials may be overridden with `SUBDESK_REGISTRY_USERNAME` and
//! `SUBDESK_REGISTRY_PASSWORD`.

use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "SUBDESK_CONFIG";

/// Maximum abstract length accepted by the registry
pub const DEFAULT_ABSTRACT_MAX_LEN: usize = 12000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Public base URL of the repository (used in links)
    pub site_url: String,

    /// Human-readable repository name (used in notification subjects)
    pub site_name: String,

    pub registry: RegistryConfig,

    pub notifications: NotificationConfig,

    pub workflow: WorkflowConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Config {
    /// Create config with sensible defaults
    pub fn with_defaults() -> Self {
        Self {
            site_url: "https://127.0.0.1".to_string(),
            site_name: "Data Repository".to_string(),
            registry: RegistryConfig::with_defaults(),
            notifications: NotificationConfig::with_defaults(),
            workflow: WorkflowConfig::with_defaults(),
        }
    }

    /// Load configuration, falling back to defaults when nothing usable is found
    pub fn load() -> Self {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(Self::user_config_path)
            .filter(|p| p.exists());

        let mut config = match path {
            Some(path) => match Self::from_file(&path) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring unreadable config, using defaults");
                    Self::with_defaults()
                }
            },
            None => Self::with_defaults(),
        };

        config.apply_env_overrides();
        config
    }

    /// Load configuration from an explicit YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(contents: &str) -> Result<Self, String> {
        serde_yml::from_str(contents).map_err(|e| e.to_string())
    }

    /// Location of the per-user config file
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "subdesk", "subdesk").map(|d| d.config_dir().join("config.yaml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(username) = std::env::var("SUBDESK_REGISTRY_USERNAME") {
            self.registry.username = username;
        }
        if let Ok(password) = std::env::var("SUBDESK_REGISTRY_PASSWORD") {
            self.registry.password = password;
        }
    }

    /// Landing page URL for a record, sent to the registry as `site_url`
    pub fn record_url(&self, record_id: &str) -> String {
        format!("{}/records/{}", self.site_url.trim_end_matches('/'), record_id)
    }

    /// Link to a request inside its community
    pub fn request_url(&self, community_slug: &str, request_id: &str) -> String {
        format!(
            "{}/communities/{}/requests/{}",
            self.site_url.trim_end_matches('/'),
            community_slug,
            request_id
        )
    }
}

/// Settings for the external DOI registry
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Prefix of the accession key that identifies records at the registry
    pub accession_number_prefix: String,

    pub username: String,

    pub password: String,

    /// Contract numbers sent with every document
    pub contract_nos: String,

    /// Sponsoring organisation sent with every document
    pub sponsor_org: String,

    /// Use the registry's test endpoint
    pub test_mode: bool,

    pub base_url: String,

    pub test_base_url: String,

    /// Per-call timeout
    pub timeout_secs: u64,

    /// Attempts per registry operation (retries are done by the caller)
    pub max_attempts: u32,

    /// Abstracts are truncated to this many characters
    pub abstract_max_len: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl RegistryConfig {
    pub fn with_defaults() -> Self {
        Self {
            accession_number_prefix: String::new(),
            username: String::new(),
            password: String::new(),
            contract_nos: String::new(),
            sponsor_org: String::new(),
            test_mode: false,
            base_url: "https://www.osti.gov/elink/2416api".to_string(),
            test_base_url: "https://www.osti.gov/elinktest/2416api".to_string(),
            timeout_secs: 30,
            max_attempts: 3,
            abstract_max_len: DEFAULT_ABSTRACT_MAX_LEN,
        }
    }

    /// Endpoint to talk to, honouring `test_mode`
    pub fn endpoint(&self) -> &str {
        if self.test_mode {
            &self.test_base_url
        } else {
            &self.base_url
        }
    }

    /// Names of required settings that are empty
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.username.is_empty() {
            missing.push("registry.username");
        }
        if self.password.is_empty() {
            missing.push("registry.password");
        }
        if self.accession_number_prefix.is_empty() {
            missing.push("registry.accession_number_prefix");
        }
        missing
    }
}

/// Settings for submission notifications
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,

    /// From address
    pub sender: String,

    /// Addresses copied on every notification
    pub cc: Vec<String>,

    /// Capacity of the outbound queue; notifications beyond it are dropped
    pub queue_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl NotificationConfig {
    pub fn with_defaults() -> Self {
        Self {
            enabled: true,
            sender: "noreply@localhost".to_string(),
            cc: Vec::new(),
            queue_capacity: 1024,
        }
    }
}

/// Settings for the review workflow
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Open requests expire after this many days (none = never)
    pub request_ttl_days: Option<u32>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl WorkflowConfig {
    pub fn with_defaults() -> Self {
        Self {
            request_ttl_days: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::with_defaults();
        assert_eq!(config.registry.abstract_max_len, 12000);
        assert_eq!(config.registry.max_attempts, 3);
        assert!(config.notifications.enabled);
        assert!(config.workflow.request_ttl_days.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
site_url: https://data.example.org/
registry:
  accession_number_prefix: MSDLIVE
  test_mode: true
notifications:
  sender: info@example.org
  cc: [info@example.org]
workflow:
  request_ttl_days: 30
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.registry.accession_number_prefix, "MSDLIVE");
        assert_eq!(config.registry.endpoint(), config.registry.test_base_url);
        assert_eq!(config.registry.timeout_secs, 30);
        assert_eq!(config.notifications.cc, vec!["info@example.org"]);
        assert_eq!(config.workflow.request_ttl_days, Some(30));
        assert_eq!(
            config.request_url("ocean", "REQ-1"),
            "https://data.example.org/communities/ocean/requests/REQ-1"
        );
    }

    #[test]
    fn test_from_file_errors() {
        let tmp = tempdir().unwrap();
        let missing = tmp.path().join("missing.yaml");
        assert!(matches!(Config::from_file(&missing), Err(ConfigError::Io { .. })));

        let bad = tmp.path().join("bad.yaml");
        std::fs::write(&bad, "registry: [not, a, mapping]").unwrap();
        assert!(matches!(Config::from_file(&bad), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_credentials() {
        let mut registry = RegistryConfig::with_defaults();
        assert_eq!(registry.missing_credentials().len(), 3);
        registry.username = "user".to_string();
        registry.password = "secret".to_string();
        registry.accession_number_prefix = "MSDLIVE".to_string();
        assert!(registry.missing_credentials().is_empty());
    }
}
