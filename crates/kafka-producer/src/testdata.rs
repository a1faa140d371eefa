//! Test data publishing helpers for Kafka integration tests
//!
//! Messages follow the shape the bridge's downstream expects:
//! `{"data": {"text": ..., "chat_id": ..., "sender": ...}}`.

use crate::KafkaTestProducer;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub data: ChatData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatData {
    pub text: String,
    pub chat_id: String,
    pub sender: String,
}

impl ChatMessage {
    pub fn new(chat_id: &str, sender: &str, text: &str) -> Self {
        Self {
            data: ChatData {
                text: text.to_string(),
                chat_id: chat_id.to_string(),
                sender: sender.to_string(),
            },
        }
    }
}

/// A small fixed conversation.
pub fn sample_chat_messages() -> Vec<ChatMessage> {
    vec![
        ChatMessage::new("chat_001", "alice", "hello"),
        ChatMessage::new("chat_001", "bob", "hi alice"),
        ChatMessage::new("chat_002", "carol", "anyone around?"),
        ChatMessage::new("chat_001", "alice", "what's the plan for today"),
        ChatMessage::new("chat_002", "dave", "here"),
    ]
}

/// Publish the sample conversation, keyed by chat id.
pub async fn publish_test_messages(
    producer: &KafkaTestProducer,
    topic: &str,
) -> anyhow::Result<Vec<ChatMessage>> {
    let messages = sample_chat_messages();
    for message in &messages {
        producer
            .publish_json(topic, Some(&message.data.chat_id), message)
            .await?;
        tracing::debug!("Published chat message: {}", message.data.text);
    }
    Ok(messages)
}
