//! Consumer and producer configuration.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Region used when neither the configuration nor `AWS_REGION` names one
pub const FALLBACK_REGION: &str = "eu-west-1";

/// Maximum entries per send-batch call and messages per receive call
pub const SERVICE_BATCH_LIMIT: usize = 10;

/// Longest long-polling wait the service accepts
pub const MAX_WAIT_TIME_SECONDS: u32 = 20;

/// Longest visibility timeout the service accepts (12 hours)
pub const MAX_VISIBILITY_TIMEOUT_SECONDS: u32 = 43_200;

/// Region from `AWS_REGION`, falling back to [`FALLBACK_REGION`]
pub fn default_region() -> String {
    std::env::var("AWS_REGION")
        .ok()
        .filter(|region| !region.is_empty())
        .unwrap_or_else(|| FALLBACK_REGION.to_string())
}

/// Consumer configuration, immutable once the consumer is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Queue to poll
    pub queue_url: String,

    /// Region of the queue, used when the consumer builds its own client
    pub region: String,

    /// System attributes to return with each message (`All` for every one)
    pub attribute_names: Vec<String>,

    /// Long-polling wait per receive call
    pub wait_time_seconds: u32,

    /// Overrides the queue's visibility timeout for received messages
    pub visibility_timeout: Option<u32>,

    /// Upper bound on messages per receive call
    pub max_number_of_messages: u32,

    /// User attributes to return with each message
    pub message_attribute_names: Vec<String>,

    /// Delay between the end of one cycle and the next receive call
    pub polling_wait_time_ms: u64,

    /// Start polling as soon as the consumer is built
    pub start_running: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            queue_url: String::new(),
            region: default_region(),
            attribute_names: Vec::new(),
            wait_time_seconds: 20,
            visibility_timeout: None,
            max_number_of_messages: 1,
            message_attribute_names: Vec::new(),
            polling_wait_time_ms: 0,
            start_running: false,
        }
    }
}

impl ConsumerConfig {
    /// Default configuration for the given queue
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            ..Self::default()
        }
    }

    /// Inter-poll delay as a [`Duration`]
    pub fn polling_wait_time(&self) -> Duration {
        Duration::from_millis(self.polling_wait_time_ms)
    }

    /// Check the configuration against the service limits
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_queue_url(&self.queue_url)?;

        if self.max_number_of_messages == 0
            || self.max_number_of_messages as usize > SERVICE_BATCH_LIMIT
        {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "max_number_of_messages must be between 1 and {}, got {}",
                    SERVICE_BATCH_LIMIT, self.max_number_of_messages
                ),
            });
        }

        if self.wait_time_seconds > MAX_WAIT_TIME_SECONDS {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "wait_time_seconds must be at most {}, got {}",
                    MAX_WAIT_TIME_SECONDS, self.wait_time_seconds
                ),
            });
        }

        if let Some(visibility_timeout) = self.visibility_timeout {
            if visibility_timeout > MAX_VISIBILITY_TIMEOUT_SECONDS {
                return Err(ConfigurationError::Invalid {
                    message: format!(
                        "visibility_timeout must be at most {}, got {}",
                        MAX_VISIBILITY_TIMEOUT_SECONDS, visibility_timeout
                    ),
                });
            }
        }

        Ok(())
    }
}

/// Producer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Queue to send to
    pub queue_url: String,

    /// Region of the queue, used when the producer builds its own client
    pub region: String,

    /// Entries per send-batch call
    pub batch_size: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            queue_url: String::new(),
            region: default_region(),
            batch_size: SERVICE_BATCH_LIMIT,
        }
    }
}

impl ProducerConfig {
    /// Default configuration for the given queue
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            ..Self::default()
        }
    }

    /// Check the configuration
    ///
    /// The upper bound on `batch_size` is enforced by the gateway, not here,
    /// since it depends on the backend.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_queue_url(&self.queue_url)?;

        if self.batch_size == 0 {
            return Err(ConfigurationError::Invalid {
                message: "batch_size must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

fn validate_queue_url(queue_url: &str) -> Result<(), ConfigurationError> {
    if queue_url.trim().is_empty() {
        return Err(ConfigurationError::Missing {
            key: "queue_url".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
