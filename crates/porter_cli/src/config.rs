//! Configuration file support for porter.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `PORTER_`, sections split by `__`,
//!    e.g. `PORTER_SOURCE__TOKEN`)
//! 3. Config file (./porter.toml, then ~/.config/porter/config.toml)
//! 4. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [source]
//! token = "y0_..."          # OAuth token
//! org_id = "1234567"
//! cloud_org = false         # true selects the X-Cloud-Org-Id header
//!
//! [target]
//! url = "https://example.youtrack.cloud"
//! token = "perm:..."
//!
//! [migration]
//! state_dir = "."
//! request_delay_ms = 500
//! retry_attempts = 3
//! retry_delay_ms = 1000
//! migrate_comments = true
//! migrate_statuses = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use porter::RetryConfig;
use porter::platform::DEFAULT_REQUEST_DELAY_MS;
use porter::retry::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_MS};
use porter::sync::{DEFAULT_PAGE_SIZE, SyncOptions};
use porter::tracker::{DEFAULT_BASE_URL, OrgHosting, TrackerSettings};
use serde::Deserialize;
use thiserror::Error;

/// Name of the local config file.
pub const LOCAL_CONFIG_FILE: &str = "porter.toml";

/// Prefix of values left over from the example config.
const PLACEHOLDER_PREFIX: &str = "YOUR_";

/// Configuration problems detected before any stage runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting '{0}' (set it in porter.toml or PORTER_{1})")]
    Missing(&'static str, &'static str),

    #[error("Invalid value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },
}

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub migration: MigrationConfig,
}

/// The system being migrated from.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub token: Option<String>,
    pub org_id: Option<String>,
    /// Send the organization id as `X-Cloud-Org-Id` instead of `X-Org-ID`.
    pub cloud_org: bool,
    pub base_url: String,
    pub page_size: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            token: None,
            org_id: None,
            cloud_org: false,
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// The system being migrated to.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub url: Option<String>,
    pub token: Option<String>,
}

/// Pacing, retries and stage toggles.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Directory holding the mapping files.
    pub state_dir: PathBuf,
    pub request_delay_ms: u64,
    pub retry_attempts: usize,
    pub retry_delay_ms: u64,
    /// Abort a stage after more than this many record errors.
    pub error_threshold: Option<usize>,
    pub migrate_comments: bool,
    pub migrate_statuses: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("."),
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            error_threshold: None,
            migrate_comments: true,
            migrate_statuses: true,
        }
    }
}

/// Validated connection settings for both systems.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub source: TrackerSettings,
    pub target_url: String,
    pub target_token: String,
}

/// Treat unset, blank and `YOUR_...` placeholder values alike.
fn filled(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.starts_with(PLACEHOLDER_PREFIX))
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/porter/config.toml)
    /// 3. Local config file (./porter.toml)
    /// 4. Environment variables with PORTER_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            tracing::debug!("Loading config from ./{}", LOCAL_CONFIG_FILE);
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g., PORTER_SOURCE__ORG_ID -> source.org_id
        builder = builder.add_source(Self::environment());

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    fn environment() -> Environment {
        Environment::with_prefix("PORTER")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "porter").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Check that both systems are fully configured.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let token = filled(self.source.token.as_deref())
            .ok_or(ConfigError::Missing("source.token", "SOURCE__TOKEN"))?;
        let org_id = filled(self.source.org_id.as_deref())
            .ok_or(ConfigError::Missing("source.org_id", "SOURCE__ORG_ID"))?;
        let target_url = filled(self.target.url.as_deref())
            .ok_or(ConfigError::Missing("target.url", "TARGET__URL"))?;
        let target_token = filled(self.target.token.as_deref())
            .ok_or(ConfigError::Missing("target.token", "TARGET__TOKEN"))?;

        if !target_url.starts_with("http://") && !target_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "target.url",
                message: format!("'{target_url}' is not an http(s) URL"),
            });
        }
        if self.source.page_size == 0 {
            return Err(ConfigError::Invalid {
                key: "source.page_size",
                message: "must be at least 1".to_string(),
            });
        }

        let hosting = if self.source.cloud_org {
            OrgHosting::Cloud
        } else {
            OrgHosting::Standard
        };

        Ok(Credentials {
            source: TrackerSettings {
                base_url: self.source.base_url.clone(),
                token: token.to_string(),
                org_id: org_id.to_string(),
                hosting,
            },
            target_url: target_url.to_string(),
            target_token: target_token.to_string(),
        })
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.migration.request_delay_ms)
    }

    pub fn state_dir(&self) -> &Path {
        &self.migration.state_dir
    }

    /// Engine options derived from the `[migration]` and `[source]` sections.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            page_size: self.source.page_size,
            retry: RetryConfig::new(
                Duration::from_millis(self.migration.retry_delay_ms),
                self.migration.retry_attempts,
            ),
            error_threshold: self.migration.error_threshold,
            migrate_comments: self.migration.migrate_comments,
            migrate_statuses: self.migration.migrate_statuses,
            ..SyncOptions::default()
        }
    }
}

/// Contents written by `porter init`.
pub fn example_config() -> String {
    format!(
        r#"# porter configuration
# Values starting with YOUR_ are treated as unset.

[source]
token = "YOUR_TRACKER_OAUTH_TOKEN"
org_id = "YOUR_TRACKER_ORG_ID"
cloud_org = false
base_url = "{DEFAULT_BASE_URL}"
page_size = {DEFAULT_PAGE_SIZE}

[target]
url = "https://your-company.youtrack.cloud"
token = "YOUR_YOUTRACK_TOKEN"

[migration]
state_dir = "."
request_delay_ms = {DEFAULT_REQUEST_DELAY_MS}
retry_attempts = {DEFAULT_RETRY_ATTEMPTS}
retry_delay_ms = {DEFAULT_RETRY_DELAY_MS}
# error_threshold = 100
migrate_comments = true
migrate_statuses = true
"#
    )
}
