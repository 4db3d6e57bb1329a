//! Configuration management for Turnstile.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{KeyBuilder, RateSpec, TimeUnit, DEFAULT_PREFIX};

/// Prefix for environment variable overrides, e.g. `TURNSTILE__REDIS__URL`.
const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for Turnstile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Redis connection settings
    #[serde(default)]
    pub redis: RedisConfig,

    /// Store key settings
    #[serde(default)]
    pub keys: KeyConfig,

    /// Named limits, looked up by callers instead of hard-coding specs
    #[serde(default)]
    pub limits: HashMap<String, LimitRule>,
}

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

/// Store key configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Namespace prefix for every key written to the store
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

impl KeyConfig {
    pub fn key_builder(&self) -> Result<KeyBuilder> {
        KeyBuilder::new(self.prefix.clone())
    }
}

/// A named quota: `quota` admissions per `window` units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitRule {
    /// Admissions allowed per window
    pub quota: u64,
    /// Window length, counted in `unit`
    #[serde(default = "default_window")]
    pub window: u32,
    /// Unit of `window`
    #[serde(default)]
    pub unit: TimeUnit,
}

fn default_window() -> u32 {
    1
}

impl LimitRule {
    /// Validate into a [`RateSpec`].
    pub fn rate_spec(&self) -> Result<RateSpec> {
        RateSpec::from_unit(self.quota, self.window, self.unit)
    }
}

impl TurnstileConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load an optional YAML file, then apply `TURNSTILE__*` environment
    /// overrides (`__` separates nesting levels).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }
        let config: TurnstileConfig = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the rate spec for a named limit.
    pub fn limit(&self, name: &str) -> Result<RateSpec> {
        self.limits
            .get(name)
            .ok_or_else(|| TurnstileError::Config(format!("no limit named {:?}", name)))?
            .rate_spec()
    }

    /// Check every setting that would otherwise only fail on first use.
    pub fn validate(&self) -> Result<()> {
        self.keys.key_builder()?;
        for (name, rule) in &self.limits {
            rule.rate_spec().map_err(|e| {
                TurnstileError::Config(format!("limit {:?} is invalid: {}", name, e))
            })?;
        }
        Ok(())
    }
}
