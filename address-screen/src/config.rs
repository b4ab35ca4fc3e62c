//! Run configuration
//!
//! Built once at process start from defaults, `.env`, and the environment,
//! then passed by reference into the runner and the risk client.

use crate::error::{Result, ScreenError};
use config::Environment;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.chainalysis.com";

/// Where the exposure category columns come from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CategorySource {
    /// Embedded catalog, identical columns on every run
    Fixed,
    /// Fetched once from the categories endpoint before screening
    Remote,
}

impl FromStr for CategorySource {
    type Err = ScreenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(CategorySource::Fixed),
            "remote" => Ok(CategorySource::Remote),
            other => Err(ScreenError::Config(format!(
                "CATEGORY_SOURCE must be 'fixed' or 'remote', got '{}'",
                other
            ))),
        }
    }
}

/// Screening configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API credential, sent as the `Token` header
    pub api_key: String,

    /// API endpoint root
    pub base_url: String,

    /// Maximum calls per second across the run
    pub rate_limit: u32,

    /// Maximum screening calls in flight
    pub max_concurrent: usize,

    /// Request indirect exposure columns
    pub include_indirect: bool,

    /// Timeout for a single HTTP attempt
    pub request_timeout_secs: u64,

    /// Deadline for one address, retries included
    pub screen_deadline_secs: u64,

    /// Retries for transport failures and 429 responses
    pub max_retries: u32,

    pub category_source: CategorySource,

    /// Input column holding the addresses
    pub address_column: String,
}

#[derive(Debug, Deserialize)]
struct EnvSettings {
    chainalysis_api_key: Option<String>,
    chainalysis_base_url: String,
    rate_limit: u32,
    max_concurrent_requests: usize,
    include_indirect_exposure: bool,
    request_timeout_secs: u64,
    screen_deadline_secs: u64,
    max_retries: u32,
    category_source: String,
    address_column: String,
}

impl Config {
    /// Configuration with defaults for everything but the credential
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            rate_limit: 5,
            max_concurrent: 10,
            include_indirect: true,
            request_timeout_secs: 30,
            screen_deadline_secs: 120,
            max_retries: 3,
            category_source: CategorySource::Fixed,
            address_column: "address".to_string(),
        }
    }

    /// Load from `.env` and process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_source(Environment::default().try_parsing(true))
    }

    fn from_source(env: Environment) -> Result<Self> {
        let settings: EnvSettings = config::Config::builder()
            .set_default("chainalysis_base_url", DEFAULT_BASE_URL)?
            .set_default("rate_limit", 5)?
            .set_default("max_concurrent_requests", 10)?
            .set_default("include_indirect_exposure", true)?
            .set_default("request_timeout_secs", 30)?
            .set_default("screen_deadline_secs", 120)?
            .set_default("max_retries", 3)?
            .set_default("category_source", "fixed")?
            .set_default("address_column", "address")?
            .add_source(env)
            .build()?
            .try_deserialize()?;

        let api_key = settings
            .chainalysis_api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ScreenError::Config("CHAINALYSIS_API_KEY environment variable is required".to_string())
            })?;

        let config = Self {
            api_key,
            base_url: settings.chainalysis_base_url.trim_end_matches('/').to_string(),
            rate_limit: settings.rate_limit,
            max_concurrent: settings.max_concurrent_requests,
            include_indirect: settings.include_indirect_exposure,
            request_timeout_secs: settings.request_timeout_secs,
            screen_deadline_secs: settings.screen_deadline_secs,
            max_retries: settings.max_retries,
            category_source: settings.category_source.parse()?,
            address_column: settings.address_column,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runner cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(ScreenError::Config("API key must not be empty".to_string()));
        }
        if self.rate_limit == 0 {
            return Err(ScreenError::Config("RATE_LIMIT must be at least 1".to_string()));
        }
        if self.max_concurrent == 0 {
            return Err(ScreenError::Config(
                "MAX_CONCURRENT_REQUESTS must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 || self.screen_deadline_secs == 0 {
            return Err(ScreenError::Config("timeouts must be at least 1 second".to_string()));
        }
        if self.address_column.trim().is_empty() {
            return Err(ScreenError::Config("ADDRESS_COLUMN must not be empty".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ScreenError::Config(format!(
                "CHAINALYSIS_BASE_URL must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn screen_deadline(&self) -> Duration {
        Duration::from_secs(self.screen_deadline_secs)
    }
}
