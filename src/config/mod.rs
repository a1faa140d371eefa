//! Process configuration.
//!
//! Everything is read once at start-up from flags or their environment
//! variables and passed by reference to the components. Required values that
//! are missing stop the process before any connection is made.

pub mod duration;

use clap::Parser;
use http_forward::{DispatcherConfig, HttpForwarderConfig, OverflowPolicy, StatusPolicy, Url};
use kafka_source::{ConsumerConfig, OffsetReset};
use std::time::Duration;

use crate::error::BridgeError;
use duration::parse_duration;

/// Kafka connection options
#[derive(Parser, Clone)]
pub struct KafkaOpts {
    /// Kafka brokers (comma-separated or multiple --brokers)
    #[arg(long, env = "SERVER", value_delimiter = ',', required = true)]
    pub brokers: Vec<String>,

    /// Topic to consume from
    #[arg(long, env = "TOPIC")]
    pub topic: String,

    /// Consumer group ID
    #[arg(long, env = "CONSUMER_GRP")]
    pub group_id: String,

    /// SASL username
    #[arg(long, env = "SASL_USERNAME")]
    pub sasl_username: String,

    /// SASL password
    #[arg(long, env = "SASL_PASSWORD", hide_env_values = true)]
    pub sasl_password: String,

    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512)
    #[arg(long, env = "SASL_MECHANISM", default_value = "PLAIN")]
    pub sasl_mechanism: String,

    /// Security protocol (SASL_SSL, SASL_PLAINTEXT, SSL, PLAINTEXT)
    #[arg(long, env = "SECURITY_PROTOCOL", default_value = "SASL_SSL")]
    pub security_protocol: String,

    /// Client id reported to the brokers
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: Option<String>,

    /// Where to start when the group has no committed position
    #[arg(long, value_enum, default_value_t = OffsetReset::Earliest)]
    pub auto_offset_reset: OffsetReset,

    /// Session timeout in milliseconds
    #[arg(long, default_value_t = 30000)]
    pub session_timeout_ms: u32,

    /// Interval of background position commits in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub auto_commit_interval_ms: u32,
}

/// Downstream HTTP options
#[derive(Parser, Clone)]
pub struct ForwardOpts {
    /// URL every record is POSTed to
    #[arg(long, env = "FORWARD_URL")]
    pub forward_url: Url,

    /// Bearer token added to every forward request
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Maximum number of forwards pending at once
    #[arg(long, env = "MAX_IN_FLIGHT", default_value_t = 50)]
    pub max_in_flight: usize,

    /// What to do with a record when every forward slot is taken
    #[arg(long, value_enum, default_value_t = OverflowPolicy::Block)]
    pub overflow_policy: OverflowPolicy,

    /// Timeout for one forward, up to the response status line
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub request_timeout: Duration,

    /// Timeout for establishing the downstream connection
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub connect_timeout: Duration,

    /// Count any response status as delivered, not only 2xx
    #[arg(long)]
    pub accept_any_status: bool,
}

#[derive(Parser, Clone)]
#[command(name = "kafka-http-bridge")]
#[command(about = "Consumes a Kafka topic and forwards every record to an HTTP endpoint")]
#[command(long_about = None)]
#[command(args_override_self = true)]
pub struct Config {
    #[command(flatten)]
    pub kafka: KafkaOpts,

    #[command(flatten)]
    pub forward: ForwardOpts,

    /// How long pending forwards may run after an interrupt
    #[arg(long, env = "SHUTDOWN_GRACE", default_value = "10s", value_parser = parse_duration)]
    pub shutdown_grace: Duration,
}

impl Config {
    /// Checks clap cannot express.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.kafka.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(BridgeError::Configuration(
                "at least one broker is required".to_string(),
            ));
        }
        if self.kafka.topic.trim().is_empty() {
            return Err(BridgeError::Configuration(
                "topic must not be empty".to_string(),
            ));
        }
        if self.kafka.group_id.trim().is_empty() {
            return Err(BridgeError::Configuration(
                "consumer group id must not be empty".to_string(),
            ));
        }
        if !matches!(self.forward.forward_url.scheme(), "http" | "https") {
            return Err(BridgeError::Configuration(format!(
                "forward URL must be http or https, got {}",
                self.forward.forward_url
            )));
        }
        if self.forward.max_in_flight == 0 {
            return Err(BridgeError::Configuration(
                "max in-flight forwards must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        let brokers: Vec<&str> = self
            .kafka
            .brokers
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .collect();

        ConsumerConfig {
            brokers: brokers.join(","),
            group_id: self.kafka.group_id.clone(),
            topic: self.kafka.topic.clone(),
            client_id: self.kafka.client_id.clone(),
            security_protocol: self.kafka.security_protocol.clone(),
            sasl_mechanism: self.kafka.sasl_mechanism.clone(),
            sasl_username: Some(self.kafka.sasl_username.clone()),
            sasl_password: Some(self.kafka.sasl_password.clone()),
            auto_offset_reset: self.kafka.auto_offset_reset,
            session_timeout_ms: self.kafka.session_timeout_ms,
            auto_commit_interval_ms: self.kafka.auto_commit_interval_ms,
            ..Default::default()
        }
    }

    pub fn forwarder_config(&self) -> HttpForwarderConfig {
        HttpForwarderConfig {
            url: self.forward.forward_url.clone(),
            api_key: self.forward.api_key.clone(),
            request_timeout: self.forward.request_timeout,
            connect_timeout: self.forward.connect_timeout,
            status_policy: if self.forward.accept_any_status {
                StatusPolicy::AcceptAny
            } else {
                StatusPolicy::RequireSuccess
            },
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_in_flight: self.forward.max_in_flight,
            overflow_policy: self.forward.overflow_policy,
        }
    }
}
