use clap::Parser;
use kafka_producer::{ChatMessage, KafkaTestProducer};
use std::time::Duration;

/// Publishes JSON chat messages for trying out kafka-http-bridge locally
///
/// To run this producer:
/// 1. Start Kafka with Docker:
///    docker run -d --name kafka -p 9092:9092 apache/kafka:latest
/// 2. Run the producer:
///    cargo run -p kafka-producer -- --topic chat-messages --count 20
/// 3. Run the bridge against the same topic with SECURITY_PROTOCOL=PLAINTEXT
#[derive(Parser)]
#[command(name = "kafka-producer")]
struct Args {
    /// Kafka broker to publish to
    #[arg(long, default_value = "localhost:9092", env = "SERVER")]
    broker: String,

    /// Topic to publish to
    #[arg(long, env = "TOPIC")]
    topic: String,

    /// Number of messages to publish
    #[arg(long, default_value_t = 10)]
    count: usize,

    /// Delay between messages in milliseconds
    #[arg(long, default_value_t = 100)]
    delay_ms: u64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run_main(Args::parse()).await {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}

async fn run_main(args: Args) -> anyhow::Result<()> {
    let producer = KafkaTestProducer::new(&args.broker).await?;
    producer.create_topic_if_not_exists(&args.topic, 3).await?;

    for i in 0..args.count {
        let chat_id = format!("chat_{:03}", i % 3);
        let message = ChatMessage::new(&chat_id, "producer", &format!("message {i}"));
        producer
            .publish_json(&args.topic, Some(&chat_id), &message)
            .await?;
        tracing::info!("Published message {}: {}", i + 1, message.data.text);

        tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;
    }

    tracing::info!("Published {} messages to '{}'", args.count, args.topic);
    Ok(())
}
