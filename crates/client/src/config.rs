//! Client configuration loader.

use crate::error::ApiError;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_URL: &str = "https://cloud.tenable.com";

pub const ENV_URL: &str = "TIO_URL";
pub const ENV_ACCESS_KEY: &str = "TIO_ACCESS_KEY";
pub const ENV_SECRET_KEY: &str = "TIO_SECRET_KEY";

/// Connection settings for the platform API.
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub build: Option<String>,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            access_key: None,
            secret_key: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            vendor: None,
            product: None,
            build: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("access_key", &redact(&self.access_key))
            .field("secret_key", &redact(&self.secret_key))
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("backoff_ms", &self.backoff_ms)
            .field("vendor", &self.vendor)
            .field("product", &self.product)
            .field("build", &self.build)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: Some(access_key.into()),
            secret_key: Some(secret_key.into()),
            ..Self::default()
        }
    }

    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ApiError::Config` if the file is missing, empty or not valid YAML.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let config_path = config_path.as_ref();

        if !config_path.exists() {
            return Err(ApiError::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;

        if content.trim().is_empty() {
            return Err(ApiError::Config("Config file is empty".to_string()));
        }

        serde_yaml::from_str(&content)
            .map_err(|e| ApiError::Config(format!("Invalid YAML: {}", e)))
    }

    /// Load a YAML file, then apply the `TIO_*` environment overrides on top.
    ///
    /// `load` alone leaves the file values untouched.
    pub fn load_with_env(config_path: impl AsRef<Path>) -> Result<Self, ApiError> {
        Ok(Self::load(config_path)?.with_env_overrides())
    }

    /// Defaults overridden by `TIO_URL`, `TIO_ACCESS_KEY` and `TIO_SECRET_KEY`.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(url) = lookup(ENV_URL) {
            self.url = url;
        }
        if let Some(access_key) = lookup(ENV_ACCESS_KEY) {
            self.access_key = Some(access_key);
        }
        if let Some(secret_key) = lookup(ENV_SECRET_KEY) {
            self.secret_key = Some(secret_key);
        }
        self
    }

    /// Check the settings needed to talk to the live API.
    pub fn validate(&self) -> Result<(), ApiError> {
        if !(self.url.starts_with("https://") || self.url.starts_with("http://")) {
            return Err(ApiError::Config(format!(
                "url must use http or https: {}",
                self.url
            )));
        }

        let missing = |key: &Option<String>| key.as_deref().map_or(true, |k| k.trim().is_empty());
        if missing(&self.access_key) || missing(&self.secret_key) {
            return Err(ApiError::Config(format!(
                "access_key and secret_key are required (set {} and {})",
                ENV_ACCESS_KEY, ENV_SECRET_KEY
            )));
        }

        if self.timeout_secs == 0 {
            return Err(ApiError::Config("timeout_secs must be positive".to_string()));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// User-Agent sent with every request.
    pub fn user_agent(&self) -> String {
        let library = format!("tio-rs/{}", env!("CARGO_PKG_VERSION"));
        match (&self.vendor, &self.product) {
            (Some(vendor), Some(product)) => format!(
                "Integration/1.0 ({}; {}; Build/{}) {}",
                vendor,
                product,
                self.build.as_deref().unwrap_or("unknown"),
                library
            ),
            _ => library,
        }
    }
}
