use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub email: EmailConfig,
    #[serde(default)]
    pub housekeeping: HousekeepingConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_wal_path")]
    pub wal_path: PathBuf,
    #[serde(default = "default_compact_on_start")]
    pub compact_on_start: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_console")]
    pub console: bool,
    /// Project id used to expand trace headers into fully qualified traces
    #[serde(default)]
    pub trace_project: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    pub jwt_secret: String,
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_secs: i64,
    #[serde(default = "default_reset_token_ttl")]
    pub reset_token_ttl_secs: i64,
    #[serde(default = "default_max_attempts_per_minute")]
    pub max_attempts_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub endpoint: String,
    pub api_key: String,
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Page the reset link points at; the token is appended as `?token=`
    pub reset_url: String,
    #[serde(default = "default_email_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HousekeepingConfig {
    #[serde(default = "default_housekeeping_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BootstrapConfig {
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            num_threads: default_num_threads(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            wal_path: default_wal_path(),
            compact_on_start: default_compact_on_start(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            console: default_console(),
            trace_project: None,
        }
    }
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_housekeeping_interval(),
        }
    }
}

// Default value functions
fn default_num_threads() -> usize {
    num_cpus::get()
}

fn default_wal_path() -> PathBuf {
    PathBuf::from("users.wal")
}

fn default_compact_on_start() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_console() -> bool {
    false
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_access_token_ttl() -> i64 {
    86_400 // 24 hours
}

fn default_reset_token_ttl() -> i64 {
    7_200 // 2 hours
}

fn default_max_attempts_per_minute() -> u32 {
    10
}

fn default_from_name() -> String {
    "Hammergen".to_string()
}

fn default_email_timeout() -> u64 {
    30
}

fn default_housekeeping_interval() -> u64 {
    300 // 5 minutes
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.runtime.num_threads == 0 {
            bail!("num_threads must be greater than 0");
        }

        if self.storage.wal_path.as_os_str().is_empty() {
            bail!("wal_path must not be empty");
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.logging.format
            );
        }

        // Validate auth config
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            bail!(
                "bcrypt_cost ({}) must be between 4 and 31",
                self.auth.bcrypt_cost
            );
        }

        if self.auth.jwt_secret.is_empty() {
            bail!("jwt_secret must not be empty");
        }

        if self.auth.access_token_ttl_secs <= 0 {
            bail!("access_token_ttl_secs must be greater than 0");
        }

        if self.auth.reset_token_ttl_secs <= 0 {
            bail!("reset_token_ttl_secs must be greater than 0");
        }

        if self.auth.max_attempts_per_minute == 0 {
            bail!("max_attempts_per_minute must be greater than 0");
        }

        // Validate email config
        if self.email.endpoint.is_empty() {
            bail!("email endpoint must not be empty");
        }

        if self.email.api_key.is_empty() {
            bail!("email api_key must not be empty");
        }

        if self.email.from_address.is_empty() {
            bail!("email from_address must not be empty");
        }

        if self.email.reset_url.is_empty() {
            bail!("email reset_url must not be empty");
        }

        if self.email.timeout_secs == 0 {
            bail!("email timeout_secs must be greater than 0");
        }

        if self.housekeeping.interval_secs == 0 {
            bail!("housekeeping interval_secs must be greater than 0");
        }

        // Bootstrap credentials come as a pair
        match (&self.bootstrap.admin_username, &self.bootstrap.admin_password) {
            (Some(_), Some(_)) | (None, None) => {}
            _ => bail!("bootstrap admin_username and admin_password must be set together"),
        }

        Ok(())
    }
}
