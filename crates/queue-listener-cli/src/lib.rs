//! # Queue Listener CLI
//!
//! Console host for the queue listener.
//!
//! This module provides CLI commands for:
//! - Running the listener until Ctrl+C or SIGTERM, then stopping it gracefully
//! - Validating and displaying the resolved configuration
//!
//! Configuration is read from an optional file (`--config` or
//! `QUEUE_AUTH_CONFIG`) and then from environment variables prefixed with
//! `QUEUE_AUTH_`; nested keys use `__`, e.g.
//! `QUEUE_AUTH_LISTENER__VISIBILITY_TIMEOUT_SECONDS=120`.

use clap::{Parser, Subcommand};
use queue_listener::{
    BackoffPolicy, DeferringHandler, Listener, ListenerConfig, ListenerError, StopOutcome,
};
use queue_runtime::providers::StorageAccount;
use queue_runtime::{
    AzureStorageQueueConfig, InMemoryConfig, ProviderConfig, QueueClientFactory, QueueConfig,
    QueueError, QueueName,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Prefix of every configuration environment variable
pub const ENV_PREFIX: &str = "QUEUE_AUTH";

// ============================================================================
// CLI Structure
// ============================================================================

/// Queue listener - processes messages from a storage queue
#[derive(Parser, Debug)]
#[command(name = "queue-listener")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Polls a storage queue and processes its messages one at a time")]
pub struct Cli {
    /// Configuration file path (TOML, YAML or JSON)
    #[arg(short, long, env = "QUEUE_AUTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level, overrides the configured level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the listener until interrupted
    Run {
        /// Grace period in seconds for the in-flight message on shutdown
        #[arg(short, long)]
        stop_timeout: Option<u64>,
    },

    /// Validate configuration
    Config {
        /// Show resolved configuration
        #[arg(short, long)]
        show: bool,

        /// Output format for configuration
        #[arg(short = 'f', long, default_value = "yaml")]
        format: ConfigFormat,
    },
}

/// Configuration format options
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
    /// TOML format
    Toml,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging initialization failed: {message}")]
    Logging { message: String },

    #[error("Listener aborted: {message}")]
    Aborted { message: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Listener(_) | Self::Aborted { .. } => 2,
            Self::Queue(_) => 3,
            Self::Io(_) => 4,
            Self::Logging { .. } => 5,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Invalid configuration value for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("Failed to render configuration: {message}")]
    Render { message: String },
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Host configuration
///
/// Every field except the queue name has a default. Without a connection
/// string the host runs against an in-memory queue.
#[derive(Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Name of the queue to listen on
    pub queue_name: Option<String>,

    /// Azure Storage connection string
    #[serde(default)]
    pub azure_storage_connectionstring: Option<String>,

    /// Storage request timeout in seconds
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    #[serde(default)]
    pub listener: ListenerSettings,

    #[serde(default)]
    pub handler: HandlerSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            queue_name: None,
            azure_storage_connectionstring: None,
            request_timeout_seconds: default_request_timeout_seconds(),
            listener: ListenerSettings::default(),
            handler: HandlerSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("queue_name", &self.queue_name)
            .field(
                "azure_storage_connectionstring",
                &self.azure_storage_connectionstring.as_ref().map(|_| "<redacted>"),
            )
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("listener", &self.listener)
            .field("handler", &self.handler)
            .field("logging", &self.logging)
            .finish()
    }
}

/// Listener timing settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerSettings {
    pub visibility_timeout_seconds: u64,
    pub backoff_base_seconds: u64,
    pub backoff_step_seconds: u64,
    pub backoff_max_steps: u32,
    pub stop_timeout_seconds: u64,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            visibility_timeout_seconds: 300,
            backoff_base_seconds: 60,
            backoff_step_seconds: 10,
            backoff_max_steps: 2,
            stop_timeout_seconds: 30,
        }
    }
}

/// Message handler settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HandlerSettings {
    /// Visibility delay of re-added messages
    pub requeue_delay_seconds: u64,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            requeue_delay_seconds: 600,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum LogFormat {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "json")]
    Json,
}

/// Longest visibility timeout a storage queue accepts
const MAX_VISIBILITY_TIMEOUT_SECONDS: u64 = 7 * 24 * 60 * 60;

impl AppConfig {
    /// Check the configuration before anything is started
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.queue_name()?;

        if let Some(connection_string) = &self.azure_storage_connectionstring {
            StorageAccount::parse(connection_string).map_err(|e| ConfigError::Invalid {
                key: "azure_storage_connectionstring".to_string(),
                message: e.to_string(),
            })?;
        }

        let visibility = self.listener.visibility_timeout_seconds;
        if visibility == 0 || visibility > MAX_VISIBILITY_TIMEOUT_SECONDS {
            return Err(ConfigError::Invalid {
                key: "listener.visibility_timeout_seconds".to_string(),
                message: format!("must be between 1 and {}", MAX_VISIBILITY_TIMEOUT_SECONDS),
            });
        }

        if self.listener.backoff_base_seconds == 0 {
            return Err(ConfigError::Invalid {
                key: "listener.backoff_base_seconds".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.request_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                key: "request_timeout_seconds".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.handler.requeue_delay_seconds > MAX_VISIBILITY_TIMEOUT_SECONDS {
            return Err(ConfigError::Invalid {
                key: "handler.requeue_delay_seconds".to_string(),
                message: format!("must be at most {}", MAX_VISIBILITY_TIMEOUT_SECONDS),
            });
        }

        EnvFilter::try_new(&self.logging.level).map_err(|e| ConfigError::Invalid {
            key: "logging.level".to_string(),
            message: e.to_string(),
        })?;

        Ok(())
    }

    /// Validated queue name
    pub fn queue_name(&self) -> Result<QueueName, ConfigError> {
        let name = self
            .queue_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: format!("{}_QUEUE_NAME", ENV_PREFIX),
            })?;

        QueueName::new(name.trim().to_string()).map_err(|e| ConfigError::Invalid {
            key: "queue_name".to_string(),
            message: e.to_string(),
        })
    }

    /// Queue provider selected by this configuration
    pub fn queue_config(&self) -> QueueConfig {
        let provider = match &self.azure_storage_connectionstring {
            Some(connection_string) => ProviderConfig::AzureStorageQueue(AzureStorageQueueConfig {
                connection_string: connection_string.clone(),
                request_timeout_seconds: self.request_timeout_seconds,
            }),
            None => ProviderConfig::InMemory(InMemoryConfig::default()),
        };

        QueueConfig { provider }
    }

    /// Listener settings in runtime form
    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            visibility_timeout: chrono::Duration::seconds(
                self.listener.visibility_timeout_seconds as i64,
            ),
            backoff: BackoffPolicy::new(
                Duration::from_secs(self.listener.backoff_base_seconds),
                Duration::from_secs(self.listener.backoff_step_seconds),
                self.listener.backoff_max_steps,
            ),
        }
    }

    /// Grace period used when stopping the listener
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.listener.stop_timeout_seconds)
    }

    /// Visibility delay of re-added messages
    pub fn requeue_delay(&self) -> Duration {
        Duration::from_secs(self.handler.requeue_delay_seconds)
    }

    /// Copy safe to print, with secrets masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.azure_storage_connectionstring.is_some() {
            copy.azure_storage_connectionstring = Some("<redacted>".to_string());
        }
        copy
    }

    /// Render the redacted configuration in the requested format
    pub fn render(&self, format: &ConfigFormat) -> Result<String, ConfigError> {
        let redacted = self.redacted();
        let rendered = match format {
            ConfigFormat::Yaml => serde_yaml::to_string(&redacted).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::to_string_pretty(&redacted).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::to_string_pretty(&redacted).map_err(|e| e.to_string()),
        };

        rendered.map_err(|message| ConfigError::Render { message })
    }
}

/// Load configuration from an optional file and the process environment
pub fn load_configuration(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    load_configuration_with_env(path, None)
}

/// Load configuration, reading environment variables from `env` when given
///
/// Sources, later overriding earlier:
/// 1. The file at `path`, format chosen by extension
/// 2. `QUEUE_AUTH_*` environment variables
pub fn load_configuration_with_env(
    path: Option<&Path>,
    env: Option<config::Map<String, String>>,
) -> Result<AppConfig, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let config: AppConfig = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()?
        .try_deserialize()?;

    config.validate()?;
    Ok(config)
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    run(Cli::parse()).await
}

/// Execute already parsed CLI arguments
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let loaded = load_configuration(cli.config.as_deref());

    // Errors while loading are still logged, with default settings.
    let logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    initialize_logging(&cli, &logging)?;

    let config = loaded?;
    match cli.command {
        Commands::Run { stop_timeout } => execute_run_command(&config, stop_timeout).await,
        Commands::Config { show, format } => execute_config_command(&config, show, format),
    }
}

/// Build the log filter from CLI override, `RUST_LOG` or configuration
pub fn log_filter(cli_level: Option<&str>, logging: &LoggingConfig) -> EnvFilter {
    match cli_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level)),
    }
}

/// Initialize logging based on CLI arguments and configuration
fn initialize_logging(cli: &Cli, logging: &LoggingConfig) -> Result<(), CliError> {
    let filter = log_filter(cli.log_level.as_deref(), logging);
    let registry = tracing_subscriber::registry().with(filter);

    let result = if cli.json_logs || logging.format == LogFormat::Json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| CliError::Logging {
        message: e.to_string(),
    })
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Run the listener until a shutdown signal arrives or the loop ends
async fn execute_run_command(config: &AppConfig, stop_timeout: Option<u64>) -> Result<(), CliError> {
    let queue_name = config.queue_name()?;
    let queue_config = config.queue_config();
    if matches!(queue_config.provider, ProviderConfig::InMemory(_)) {
        warn!(
            queue = %queue_name,
            "No storage connection string configured, using an in-memory queue"
        );
    }

    let queue = QueueClientFactory::create_client(&queue_config, queue_name.clone())?;
    let handler = DeferringHandler::new(queue.clone()).with_delay(config.requeue_delay());
    let requeue_delay = handler.delay();
    let listener = Listener::new(queue, Arc::new(handler), config.listener_config());

    listener.start().await?;
    info!(
        queue = %queue_name,
        requeue_delay_secs = requeue_delay.as_secs(),
        "Listener running, press Ctrl+C to stop"
    );

    tokio::select! {
        signal = wait_for_shutdown_signal() => {
            let signal = signal?;
            info!(signal = signal, "Shutdown signal received");
        }
        _ = listener.loop_exited() => {
            warn!(queue = %queue_name, "Listener loop ended on its own");
        }
    }

    let timeout = stop_timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.stop_timeout());

    match listener.stop(timeout).await? {
        StopOutcome::Drained => {
            info!(queue = %queue_name, "Listener drained");
            Ok(())
        }
        StopOutcome::TimedOut => {
            warn!(
                queue = %queue_name,
                timeout_secs = timeout.as_secs(),
                "In-flight message did not finish before the stop timeout"
            );
            Ok(())
        }
        StopOutcome::Panicked => {
            error!(queue = %queue_name, "Listener loop panicked");
            Err(CliError::Aborted {
                message: "listener loop panicked".to_string(),
            })
        }
        StopOutcome::Faulted(e) => {
            error!(queue = %queue_name, error = %e, "Listener loop failed");
            Err(CliError::Queue(e))
        }
    }
}

/// Validate (and optionally print) the resolved configuration
fn execute_config_command(config: &AppConfig, show: bool, format: ConfigFormat) -> Result<(), CliError> {
    info!(show = show, format = ?format, "Processing config command");

    if show {
        println!("{}", config.render(&format)?);
    } else {
        println!("Configuration is valid");
    }

    Ok(())
}

/// Wait for Ctrl+C or, on Unix, SIGTERM and name the signal received
async fn wait_for_shutdown_signal() -> Result<&'static str, std::io::Error> {
    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    #[cfg(unix)]
    let terminated = async move {
        terminate.recv().await;
    };

    #[cfg(not(unix))]
    let terminated = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
        _ = terminated => Ok("SIGTERM"),
    }
}
