//! Command-line interface for kafka-http-bridge
//!
//! # Usage Examples
//!
//! ```bash
//! # All connection settings from the environment
//! export SERVER=broker-1:9093,broker-2:9093
//! export TOPIC=chat-messages
//! export CONSUMER_GRP=chat-bridge
//! export SASL_USERNAME=svc SASL_PASSWORD=secret
//! export FORWARD_URL=http://localhost:8080/
//! kafka-http-bridge
//!
//! # Shed load instead of slowing the consumer down
//! kafka-http-bridge --max-in-flight 20 --overflow-policy drop-oldest
//! ```
//!
//! ## Exit Codes
//! - 0: stopped by Ctrl+C / SIGTERM
//! - 1: broker connection or subscription failure
//! - 2: missing or invalid configuration

use clap::Parser;
use http_forward::{Dispatcher, HttpForwarder, TracingSink};
use kafka_http_bridge::{run_bridge, shutdown_signal, BridgeError, Config};
use kafka_source::Consumer;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e:#}");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<(), BridgeError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let forwarder = HttpForwarder::new(config.forwarder_config())?;
    let dispatcher = Dispatcher::new(
        forwarder,
        Arc::new(TracingSink),
        config.dispatcher_config(),
    )?;

    let mut consumer = Consumer::connect(config.consumer_config()).await?;

    info!("Listening to topic: {}", consumer.config().topic);
    info!(
        "Forwarding to {} with at most {} requests in flight ({:?} when full)",
        config.forward.forward_url,
        dispatcher.config().max_in_flight,
        dispatcher.config().overflow_policy
    );
    info!("Waiting for messages... (Press Ctrl+C to stop)");

    run_bridge(
        &mut consumer,
        &dispatcher,
        shutdown_signal(),
        config.shutdown_grace,
    )
    .await?;

    Ok(())
}
