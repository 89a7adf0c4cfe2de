//! File-based logging with per-component routing.
//!
//! | Log File            | Component                       | Target Prefixes                        |
//! |---------------------|---------------------------------|----------------------------------------|
//! | keylock.log         | Root logger (all components)    | (all)                                  |
//! | lock-protocol.log   | Acquire / release / store calls | keylock_core                           |
//! | demo.log            | Demo endpoints and services     | keylock_server::api, keylock_server::service |
//!
//! Log files are written to `logs/` by default. Override with
//! `KEYLOCK_LOG_DIR` or `logging.dir` in the configuration.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

const DEFAULT_LOG_DIR: &str = "logs";
const ROOT_LOG_FILE: &str = "keylock.log";

// ---------------------------------------------------------------------------
// Component log file definitions
// ---------------------------------------------------------------------------

struct ComponentLogDef {
    /// Log file name (e.g. "lock-protocol.log")
    file_name: &'static str,
    /// Target module prefixes routed to this file
    targets: &'static [&'static str],
}

/// Each entry produces a separate rolling log file. Events are routed by
/// their `tracing` target; `keylock.log` always captures everything.
const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "lock-protocol.log",
        targets: &["keylock_core"],
    },
    ComponentLogDef {
        file_name: "demo.log",
        targets: &["keylock_server::api", "keylock_server::service"],
    },
];

// ---------------------------------------------------------------------------
// Log rotation policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Daily,
    Hourly,
    /// Single file
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub console_level: Level,
    /// File logging is off unless enabled
    pub file_logging: bool,
    pub file_level: Level,
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            console_output: true,
            console_level: Level::INFO,
            file_logging: false,
            file_level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Create from application configuration.
    ///
    /// `KEYLOCK_LOG_DIR` wins over the configured directory.
    pub fn from_config(
        log_dir: Option<String>,
        console_output: bool,
        file_logging: bool,
        level: String,
    ) -> Self {
        let log_dir = std::env::var("KEYLOCK_LOG_DIR")
            .ok()
            .or(log_dir)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));

        let level = level.parse().unwrap_or(Level::INFO);

        Self {
            log_dir,
            console_output,
            console_level: level,
            file_logging,
            file_level: level,
            rotation: LogRotation::Daily,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging guard
// ---------------------------------------------------------------------------

/// Keeps the non-blocking file writers alive; dropping it flushes them.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

/// Initialize console and optional file logging.
///
/// `RUST_LOG` overrides the configured level of the console and root file
/// layers. Component files use per-layer [`Targets`] filters.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.console_level.to_string()));
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter);
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        let root_appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, ROOT_LOG_FILE);
        let (root_nb, root_guard) = tracing_appender::non_blocking(root_appender);
        guards.push(root_guard);

        let root_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.file_level.to_string()));
        let root_layer = fmt::layer()
            .with_writer(root_nb)
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_filter(root_filter);
        layers.push(Box::new(root_layer));

        for component in COMPONENT_LOGS {
            let appender = RollingFileAppender::new(
                config.rotation.into(),
                &config.log_dir,
                component.file_name,
            );
            let (nb, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);

            let targets = component_targets(component, config.file_level);
            let layer = fmt::layer()
                .with_writer(nb)
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(false)
                .with_filter(targets);
            layers.push(Box::new(layer));
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            "File logging initialized: {} (root) + {} component log files",
            ROOT_LOG_FILE,
            COMPONENT_LOGS.len()
        );
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}

fn component_targets(component: &ComponentLogDef, level: Level) -> Targets {
    let mut targets = Targets::new();
    for target in component.targets {
        targets = targets.with_target(*target, LevelFilter::from_level(level));
    }
    targets
}
