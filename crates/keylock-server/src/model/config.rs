//! Configuration management for the Keylock server
//!
//! Sources, lowest precedence first: `conf/application.yml` (optional),
//! `KEYLOCK__*` environment variables, command line flags.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use keylock_core::LockConfig;
use serde::Deserialize;

use crate::startup::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Command line arguments for the server
#[derive(Debug, Default, Parser)]
#[command(name = "keylock-server", version, about)]
pub struct Cli {
    /// Configuration file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
    /// Lock store: memory | redis
    #[arg(long = "store")]
    pub store: Option<String>,
    #[arg(long = "redis-url", env = "KEYLOCK_REDIS_URL")]
    pub redis_url: Option<String>,
    /// Application namespace prefixed to every lock key
    #[arg(short = 'n', long = "namespace")]
    pub namespace: Option<String>,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Build from the process command line
    pub fn new() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(args: Cli) -> anyhow::Result<Self> {
        let mut config_builder = Config::builder()
            .add_source(File::with_name(&args.config).required(false))
            .add_source(
                Environment::with_prefix("KEYLOCK")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = args.port {
            config_builder = config_builder
                .set_override("server.port", i64::from(v))
                .context("Failed to set server port override")?;
        }
        if let Some(v) = args.store {
            config_builder = config_builder
                .set_override("lock.store", v.to_lowercase())
                .context("Failed to set store override")?;
        }
        if let Some(v) = args.redis_url {
            config_builder = config_builder
                .set_override("lock.redis_url", v)
                .context("Failed to set redis url override")?;
        }
        if let Some(v) = args.namespace {
            config_builder = config_builder
                .set_override("lock.namespace", v)
                .context("Failed to set namespace override")?;
        }

        let app_config = config_builder
            .build()
            .with_context(|| format!("Failed to build configuration - check {}", args.config))?;

        Ok(Configuration { config: app_config })
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string("server.address")
            .unwrap_or("0.0.0.0".to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.config
            .get::<u16>("server.port")
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    // ========================================================================
    // Lock Configuration
    // ========================================================================

    /// Lock settings; anything not configured keeps the library default
    ///
    /// The `lock` table is deserialized into [`LockConfig`], so negative or
    /// malformed values are rejected instead of wrapping.
    pub fn lock_config(&self) -> anyhow::Result<LockConfig> {
        let lock_config = self
            .section::<LockConfig>("lock")
            .context("Invalid lock configuration")?
            .unwrap_or_default();

        lock_config.validate()?;
        Ok(lock_config)
    }

    // ========================================================================
    // Demo Configuration
    // ========================================================================

    pub fn demo_config(&self) -> anyhow::Result<DemoConfig> {
        let demo = self
            .section::<DemoSection>("demo")
            .context("Invalid demo configuration")?
            .unwrap_or_default();
        Ok(demo.into())
    }

    /// Deserialize a whole table; `None` when it is not configured at all
    fn section<T: serde::de::DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.config.get::<T>(key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string("logging.dir").ok(),
            self.config.get_bool("logging.console").unwrap_or(true),
            self.config.get_bool("logging.file").unwrap_or(false),
            self.config
                .get_string("logging.level")
                .unwrap_or("info".to_string()),
        )
    }
}

/// Settings for the demo endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    /// Default number of contending workers for `/distributelock/getlock`
    pub workers: usize,
    /// How long a worker or guarded method holds the lock
    pub hold: Duration,
    /// TTL of demo locks
    pub lock_ttl: Duration,
    /// Retry budget of contending workers
    pub max_retries: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            hold: Duration::from_millis(100),
            lock_ttl: Duration::from_secs(100),
            max_retries: 1000,
        }
    }
}

/// `demo` table as written in the config file
#[derive(Debug, Deserialize)]
#[serde(default)]
struct DemoSection {
    workers: usize,
    hold_ms: u64,
    lock_ttl_ms: u64,
    max_retries: u32,
}

impl Default for DemoSection {
    fn default() -> Self {
        let defaults = DemoConfig::default();
        Self {
            workers: defaults.workers,
            hold_ms: defaults.hold.as_millis() as u64,
            lock_ttl_ms: defaults.lock_ttl.as_millis() as u64,
            max_retries: defaults.max_retries,
        }
    }
}

impl From<DemoSection> for DemoConfig {
    fn from(section: DemoSection) -> Self {
        Self {
            workers: section.workers,
            hold: Duration::from_millis(section.hold_ms),
            lock_ttl: Duration::from_millis(section.lock_ttl_ms),
            max_retries: section.max_retries,
        }
    }
}
