//! # SQS Broker CLI
//!
//! Command-line interface over the `sqs-broker` library.
//!
//! This module provides CLI commands for:
//! - Consuming messages from a queue and printing them
//! - Sending messages to a queue in batches
//! - Validating and showing the resolved configuration
//!
//! Configuration is layered: `/etc/sqs-broker/config.*`, then
//! `./config/sqs-broker.*`, then the file given with `--config`, then
//! `SQS_BROKER__`-prefixed environment variables (`__` separates sections,
//! e.g. `SQS_BROKER__CONSUMER__QUEUE_URL`).

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use sqs_broker::{
    handler_fn, ConfigurationError, Consumer, ConsumerConfig, ConsumerEvent, OutboundMessage,
    Producer, ProducerConfig, ProducerError, QueueError, ReceivedMessage, SendBatchResultEntry,
    SqsGateway, SqsGatewayConfig, Subscription,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// SQS Broker CLI - consume from and send to AWS SQS queues
#[derive(Parser)]
#[command(name = "sqs-broker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Consume from and send to AWS SQS queues")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SQS_BROKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level or filter directive; overrides the configured level
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
#[derive(Subcommand)]
pub enum Commands {
    /// Poll a queue, print every message and delete it once printed
    Consume(ConsumeArgs),

    /// Send messages to a queue
    Send(SendArgs),

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

/// Arguments of the `consume` command; unset values come from configuration
#[derive(Args, Debug, Default)]
pub struct ConsumeArgs {
    /// Queue to poll
    #[arg(short, long)]
    pub queue_url: Option<String>,

    /// Messages per receive call (1-10)
    #[arg(short, long)]
    pub max_messages: Option<u32>,

    /// Long-polling wait per receive call in seconds (0-20)
    #[arg(short, long)]
    pub wait_time: Option<u32>,

    /// Visibility timeout for received messages in seconds
    #[arg(long)]
    pub visibility_timeout: Option<u32>,

    /// Delay between receive calls in milliseconds
    #[arg(long)]
    pub polling_delay_ms: Option<u64>,

    /// System attribute to request (repeatable, `All` for every one)
    #[arg(long = "attribute-name")]
    pub attribute_names: Vec<String>,

    /// Message attribute to request (repeatable, supports `prefix.*`)
    #[arg(long = "message-attribute-name")]
    pub message_attribute_names: Vec<String>,

    /// Stop after this many messages were processed
    #[arg(long)]
    pub limit: Option<usize>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments of the `send` command
#[derive(Args, Debug, Default)]
pub struct SendArgs {
    /// Queue to send to
    #[arg(short, long)]
    pub queue_url: Option<String>,

    /// Entries per send-batch call (1-10)
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Use random entry ids instead of the body (needed when bodies repeat)
    #[arg(short, long)]
    pub generate_ids: bool,

    /// Read bodies from a file, one per non-empty line
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Message bodies
    pub bodies: Vec<String>,
}

/// Output format options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON document per line
    Json,
}

/// Configuration format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
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

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Send failed: {0}")]
    Send(#[from] ProducerError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output formatting failed: {message}")]
    Output { message: String },

    #[error("Logging setup failed: {message}")]
    Logging { message: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Queue(_) => 2,
            Self::Send(_) => 3,
            Self::InvalidArgument { .. } => 4,
            Self::Io(_) => 5,
            Self::Output { .. } => 6,
            Self::Logging { .. } => 7,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("{0}")]
    Invalid(#[from] ConfigurationError),
}

// ============================================================================
// Configuration Types
// ============================================================================

/// CLI configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CliConfig {
    /// SQS connection; credentials fall back to the `AWS_*` environment
    pub gateway: SqsGatewayConfig,
    /// Defaults for `consume`
    pub consumer: ConsumerConfig,
    /// Defaults for `send`
    pub producer: ProducerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl CliConfig {
    /// Gateway settings with unset values filled from the environment
    pub fn gateway_config(&self) -> SqsGatewayConfig {
        let env = SqsGatewayConfig::from_env(&self.gateway.region);
        SqsGatewayConfig {
            region: self.gateway.region.clone(),
            endpoint: self.gateway.endpoint.clone().or(env.endpoint),
            access_key_id: self.gateway.access_key_id.clone().or(env.access_key_id),
            secret_access_key: self
                .gateway
                .secret_access_key
                .clone()
                .or(env.secret_access_key),
            session_token: self.gateway.session_token.clone().or(env.session_token),
            request_timeout_seconds: self.gateway.request_timeout_seconds,
        }
    }

    /// Check the settings that are present.
    ///
    /// Queue URLs may be supplied on the command line, so sections without
    /// one are not validated here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.region.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "gateway.region".to_string(),
            }
            .into());
        }
        if u64::from(self.consumer.wait_time_seconds) >= self.gateway.request_timeout_seconds {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "gateway.request_timeout_seconds ({}) must exceed consumer.wait_time_seconds ({})",
                    self.gateway.request_timeout_seconds, self.consumer.wait_time_seconds
                ),
            }
            .into());
        }
        if !self.consumer.queue_url.is_empty() {
            self.consumer.validate()?;
        }
        if !self.producer.queue_url.is_empty() {
            self.producer.validate()?;
        }
        Ok(())
    }

    /// Copy with credentials masked, for display
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        let mask = |value: &mut Option<String>| {
            if value.is_some() {
                *value = Some("<redacted>".to_string());
            }
        };
        mask(&mut config.gateway.secret_access_key);
        mask(&mut config.gateway.session_token);
        config
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
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
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum LogFormat {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "json")]
    Json,
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    // Load configuration
    let config = load_configuration(cli.config.as_deref())?;

    // Initialize logging
    initialize_logging(&cli, &config.logging)?;

    // Execute command
    match cli.command {
        Commands::Consume(args) => execute_consume_command(args, &config).await,
        Commands::Send(args) => execute_send_command(args, &config).await,
        Commands::Config { show, format } => execute_config_command(show, format, &config),
    }
}

/// Initialize logging; `RUST_LOG` wins over `--log-level`, which wins over
/// the configured level
pub fn initialize_logging(cli: &Cli, logging: &LoggingConfig) -> Result<(), CliError> {
    let level = cli.log_level.as_deref().unwrap_or(&logging.level);
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|e| CliError::InvalidArgument {
            arg: "log-level".to_string(),
            message: e.to_string(),
        })?,
    };

    // Logs go to stderr so stdout only carries command output
    let registry = tracing_subscriber::registry().with(filter);
    let result = if cli.json_logs || logging.format == LogFormat::Json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| CliError::Logging {
        message: e.to_string(),
    })
}

/// Load configuration from the layered sources
pub fn load_configuration(config_path: Option<&Path>) -> Result<CliConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name("/etc/sqs-broker/config").required(false))
        .add_source(config::File::with_name("config/sqs-broker").required(false));

    if let Some(path) = config_path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let config: CliConfig = builder
        .add_source(
            config::Environment::with_prefix("SQS_BROKER")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    config.validate()?;
    Ok(config)
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Resolve the consumer configuration from arguments over configuration
pub fn consumer_config(args: &ConsumeArgs, config: &CliConfig) -> ConsumerConfig {
    let mut consumer = config.consumer.clone();
    consumer.region = config.gateway.region.clone();
    consumer.start_running = false;

    if let Some(queue_url) = &args.queue_url {
        consumer.queue_url = queue_url.clone();
    }
    if let Some(max_messages) = args.max_messages {
        consumer.max_number_of_messages = max_messages;
    }
    if let Some(wait_time) = args.wait_time {
        consumer.wait_time_seconds = wait_time;
    }
    if args.visibility_timeout.is_some() {
        consumer.visibility_timeout = args.visibility_timeout;
    }
    if let Some(polling_delay_ms) = args.polling_delay_ms {
        consumer.polling_wait_time_ms = polling_delay_ms;
    }
    if !args.attribute_names.is_empty() {
        consumer.attribute_names = args.attribute_names.clone();
    }
    if !args.message_attribute_names.is_empty() {
        consumer.message_attribute_names = args.message_attribute_names.clone();
    }
    consumer
}

/// Resolve the producer configuration from arguments over configuration
pub fn producer_config(args: &SendArgs, config: &CliConfig) -> ProducerConfig {
    let mut producer = config.producer.clone();
    producer.region = config.gateway.region.clone();

    if let Some(queue_url) = &args.queue_url {
        producer.queue_url = queue_url.clone();
    }
    if let Some(batch_size) = args.batch_size {
        producer.batch_size = batch_size;
    }
    producer
}

/// Render a received message as one output line
pub fn format_message(message: &ReceivedMessage, format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Text => Ok(format!(
            "{}\t{}",
            message.message_id.as_deref().unwrap_or("-"),
            message.body
        )),
        OutputFormat::Json => serde_json::to_string(message).map_err(|e| CliError::Output {
            message: e.to_string(),
        }),
    }
}

/// Render an accepted entry as one output line
pub fn format_send_result(
    entry: &SendBatchResultEntry,
    format: OutputFormat,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Text => Ok(format!("{}\t{}", entry.id, entry.message_id)),
        OutputFormat::Json => serde_json::to_string(entry).map_err(|e| CliError::Output {
            message: e.to_string(),
        }),
    }
}

/// Execute consume command
async fn execute_consume_command(args: ConsumeArgs, config: &CliConfig) -> Result<(), CliError> {
    let consumer_config = consumer_config(&args, config);
    info!(
        queue_url = %consumer_config.queue_url,
        max_messages = consumer_config.max_number_of_messages,
        wait_time = consumer_config.wait_time_seconds,
        limit = ?args.limit,
        "Consuming messages"
    );

    let gateway = Arc::new(SqsGateway::new(config.gateway_config())?);
    let format = args.format;
    let handler = handler_fn(move |message: Arc<ReceivedMessage>| async move {
        let line = format_message(&message, format)?;
        writeln!(std::io::stdout().lock(), "{}", line)?;
        Ok::<(), CliError>(())
    });

    let consumer = Consumer::with_gateway(consumer_config.clone(), gateway, handler)?;
    let mut events = consumer.subscribe();
    consumer.start();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut processed = 0usize;
    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted; stopping consumer");
                break Ok(());
            }
            event = events.recv() => match event {
                Some(ConsumerEvent::MessageProcessed(_)) => {
                    processed += 1;
                    if args.limit.is_some_and(|limit| processed >= limit) {
                        info!(processed = processed, "Message limit reached");
                        break Ok(());
                    }
                }
                Some(ConsumerEvent::ProcessingError { error, message }) => {
                    warn!(
                        message_id = ?message.message_id,
                        error = %error,
                        "Message not acknowledged"
                    );
                }
                Some(ConsumerEvent::Error(error)) => break Err(CliError::Queue((*error).clone())),
                Some(_) => {}
                None => break Ok(()),
            }
        }
    };

    consumer.stop();
    if outcome.is_ok() {
        // Let an in-flight cycle finish so printed messages get deleted
        let grace = shutdown_grace(&consumer_config);
        if tokio::time::timeout(grace, wait_for_stop(&mut events))
            .await
            .is_err()
        {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "Consumer did not stop in time; in-flight deletes may be lost"
            );
        }
    }

    info!(processed = processed, "Consumer finished");
    outcome
}

/// How long `consume` waits for the loop to reach its stop boundary: one
/// receive call, the inter-poll delay, plus a second of slack
pub fn shutdown_grace(config: &ConsumerConfig) -> Duration {
    Duration::from_secs(u64::from(config.wait_time_seconds) + 1) + config.polling_wait_time()
}

async fn wait_for_stop(events: &mut Subscription<ConsumerEvent>) {
    while let Some(event) = events.recv().await {
        if matches!(event, ConsumerEvent::Stopped | ConsumerEvent::Error(_)) {
            return;
        }
    }
}

/// Collect message bodies from arguments and the optional file
pub fn collect_bodies(args: &SendArgs) -> Result<Vec<String>, CliError> {
    let mut bodies = args.bodies.clone();
    if let Some(path) = &args.file {
        let content = std::fs::read_to_string(path)?;
        bodies.extend(
            content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(String::from),
        );
    }

    if bodies.is_empty() {
        return Err(CliError::InvalidArgument {
            arg: "BODIES".to_string(),
            message: "no message bodies given".to_string(),
        });
    }
    Ok(bodies)
}

/// Execute send command
async fn execute_send_command(args: SendArgs, config: &CliConfig) -> Result<(), CliError> {
    let producer_config = producer_config(&args, config);
    let bodies = collect_bodies(&args)?;
    info!(
        queue_url = %producer_config.queue_url,
        count = bodies.len(),
        batch_size = producer_config.batch_size,
        "Sending messages"
    );

    let messages: Vec<OutboundMessage> = bodies
        .into_iter()
        .map(|body| {
            if args.generate_ids {
                OutboundMessage::with_generated_id(body)
            } else {
                OutboundMessage::from(body)
            }
        })
        .collect();

    let gateway = Arc::new(SqsGateway::new(config.gateway_config())?);
    let producer = Producer::with_gateway(producer_config, gateway)?;

    let result = producer.send(messages).await;
    let sent: &[SendBatchResultEntry] = match &result {
        Ok(sent) => sent.as_slice(),
        Err(ProducerError::PartialFailure { successful, .. }) => successful.as_slice(),
        Err(_) => &[],
    };

    let mut stdout = std::io::stdout().lock();
    for entry in sent {
        writeln!(stdout, "{}", format_send_result(entry, args.format)?)?;
    }
    debug!(sent = sent.len(), "Printed send results");

    result.map(|_| ()).map_err(CliError::from)
}

/// Execute config command
fn execute_config_command(
    show: bool,
    format: ConfigFormat,
    config: &CliConfig,
) -> Result<(), CliError> {
    info!(show = show, format = ?format, "Processing config command");

    let mut stdout = std::io::stdout().lock();
    if !show {
        writeln!(stdout, "Configuration is valid")?;
        return Ok(());
    }

    writeln!(stdout, "{}", render_config(&config.redacted(), format)?)?;
    Ok(())
}

/// Serialize configuration in the requested format
pub fn render_config(config: &CliConfig, format: ConfigFormat) -> Result<String, CliError> {
    let output = |message: String| CliError::Output { message };
    match format {
        ConfigFormat::Yaml => serde_yaml::to_string(config).map_err(|e| output(e.to_string())),
        ConfigFormat::Json => {
            serde_json::to_string_pretty(config).map_err(|e| output(e.to_string()))
        }
        ConfigFormat::Toml => toml::to_string_pretty(config).map_err(|e| output(e.to_string())),
    }
}
