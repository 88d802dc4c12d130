//! Configuration management for the mirror tool.
//!
//! Everything lives under a per-user hidden directory:
//! - `urls`: one `<name> : <url>` pair per line
//! - `account`: optional username and password lines for HTTP Basic auth
//! - `settings.toml`: optional tuning for logging and downloads

use crate::resolve::StrategyChoice;
use crate::utils::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Name of the hidden directory inside the user's home
pub const HIDDEN_DIR: &str = ".target-platform";

pub const URLS_FILE: &str = "urls";
pub const ACCOUNT_FILE: &str = "account";
pub const SETTINGS_FILE: &str = "settings.toml";

/// Resolve the default hidden root (`~/.target-platform`)
pub fn default_home() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(HIDDEN_DIR))
        .ok_or_else(|| MirrorError::Config("Unable to determine the home directory".to_string()))
}

/// HTTP Basic credentials attached to every request when configured
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// The selected mirror target. Immutable for the whole session.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub name: String,
    pub root_url: Url,
    pub credentials: Option<Credentials>,
}

impl TargetConfig {
    /// Build a target, appending the trailing `/` to the root URL if missing
    pub fn new(name: &str, root_url: &str, credentials: Option<Credentials>) -> Result<Self> {
        let mut root = root_url.trim().to_string();
        if !root.ends_with('/') {
            root.push('/');
        }

        Ok(Self {
            name: name.to_string(),
            root_url: Url::parse(&root)?,
            credentials,
        })
    }

    /// Load the named target from `<home>/urls` and the optional `<home>/account`
    pub fn load(home: &Path, name: &str) -> Result<Self> {
        let urls_path = home.join(URLS_FILE);
        let content = std::fs::read_to_string(&urls_path).map_err(|e| {
            MirrorError::Config(format!("Cannot read {}: {}", urls_path.display(), e))
        })?;

        let url = find_target(&content, name).ok_or_else(|| MirrorError::TargetNotFound {
            name: name.to_string(),
            file: urls_path.display().to_string(),
        })?;

        let account_path = home.join(ACCOUNT_FILE);
        let credentials = if account_path.is_file() {
            Some(parse_account(&std::fs::read_to_string(&account_path)?)?)
        } else {
            None
        };

        Self::new(name, &url, credentials)
    }
}

/// Parse `<name> : <url>` lines, skipping anything that does not split into exactly two parts
pub fn parse_urls(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(" : ").collect();
            match parts.as_slice() {
                [name, url] => Some((name.trim().to_string(), url.trim().to_string())),
                _ => None,
            }
        })
        .collect()
}

/// Find the URL for a target name. The first matching line wins.
pub fn find_target(content: &str, name: &str) -> Option<String> {
    parse_urls(content)
        .into_iter()
        .find(|(candidate, _)| candidate == name)
        .map(|(_, url)| url)
}

/// Parse the account file: username on the first line, password on the second
pub fn parse_account(content: &str) -> Result<Credentials> {
    let mut lines = content.lines().map(|line| line.trim_end_matches('\r'));
    match (lines.next(), lines.next()) {
        (Some(username), Some(password)) => Ok(Credentials::new(username, password)),
        _ => Err(MirrorError::Config(
            "The account file must contain a username line and a password line".to_string(),
        )),
    }
}

/// Optional tuning loaded from `settings.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log: LogSettings,

    #[serde(default)]
    pub download: DownloadSettings,

    #[serde(default)]
    pub resolve: ResolveSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveSettings {
    /// auto (metadata, then listing), metadata or listing
    #[serde(default)]
    pub strategy: StrategyChoice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Worker count, 0 means the host's available parallelism
    #[serde(default)]
    pub workers: usize,

    /// Capacity of the worker report channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout, 0 disables it
    #[serde(default)]
    pub request_timeout_secs: u64,

    /// Retries for transient failures of a single fetch
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_exponential_backoff")]
    pub exponential_backoff: bool,
}

// Default values
fn default_log_level() -> String {
    "info".to_string()
}

fn default_channel_capacity() -> usize {
    256
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_exponential_backoff() -> bool {
    true
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            workers: 0,
            channel_capacity: default_channel_capacity(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: 0,
            retry_count: 0,
            retry_delay_ms: default_retry_delay_ms(),
            exponential_backoff: default_exponential_backoff(),
        }
    }
}

impl DownloadSettings {
    /// Effective worker count before capping at the number of files
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// Delay before the given retry attempt (1-based), capped at 60 seconds
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let delay = if self.exponential_backoff {
            self.retry_delay_ms
                .saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)))
        } else {
            self.retry_delay_ms
        };
        Duration::from_millis(delay.min(60_000))
    }
}

impl Settings {
    /// Load `<home>/settings.toml`, falling back to defaults when it does not exist
    pub fn load(home: &Path) -> Result<Self> {
        let path = home.join(SETTINGS_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&content)?)
    }
}
