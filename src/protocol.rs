//! Control-message protocol
//!
//! Inbound payloads are UTF-8 JSON envelopes tagged by `type`. The wire format
//! carries no version, so anything that doesn't decode is noise: it is dropped
//! with a trace log and never surfaces as an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::emotion::EmotionalState;
use crate::robot::RobotState;
use crate::Result;

/// Topic used for chat text streams
pub const CHAT_TOPIC: &str = "lk.chat";

/// Decoded control message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEnvelope {
    /// Chat text for the transcript
    Message { content: String },
    /// Explicit robot state from the remote peer
    State { state: RobotState },
    /// Explicit emotional state from the remote peer
    Emotion { emotion: EmotionalState },
}

/// Decode an inbound payload, dropping anything unrecognized
#[must_use]
pub fn decode(payload: &[u8]) -> Option<ControlEnvelope> {
    match serde_json::from_slice(payload) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            tracing::trace!(len = payload.len(), error = %e, "dropping undecodable control payload");
            None
        }
    }
}

/// Encode an envelope for the wire
///
/// # Errors
///
/// Returns error if serialization fails
pub fn encode(envelope: &ControlEnvelope) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(envelope)?)
}

/// Filter an inbound chat text stream
///
/// Accepts text on the chat topic or with no topic, trimmed; empty text and
/// other topics are ignored.
#[must_use]
pub fn accept_text_stream<'a>(topic: Option<&str>, text: &'a str) -> Option<&'a str> {
    if let Some(topic) = topic.filter(|t| *t != CHAT_TOPIC) {
        tracing::debug!(topic, "ignoring text stream on non-chat topic");
        return None;
    }
    let text = text.trim();
    if text.is_empty() {
        tracing::debug!("ignoring empty text stream");
        return None;
    }
    Some(text)
}

/// Outbound side of the message channel
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a payload reliably
    async fn send(&self, payload: Vec<u8>) -> Result<()>;

    /// Whether the transport carries topic-addressed text streams
    fn supports_text_streams(&self) -> bool {
        false
    }

    /// Send text on a topic
    ///
    /// Only called when [`Transport::supports_text_streams`] is true; the
    /// default wraps the text in a `message` envelope.
    async fn send_text(&self, _topic: &str, text: &str) -> Result<()> {
        self.send(encode(&ControlEnvelope::Message {
            content: text.to_string(),
        })?)
        .await
    }
}

/// Send user-authored text, preferring a chat text stream when available
///
/// # Errors
///
/// Returns error if the transport fails to deliver
pub async fn send_user_text(transport: &dyn Transport, text: &str) -> Result<()> {
    if transport.supports_text_streams() {
        return transport.send_text(CHAT_TOPIC, text).await;
    }
    let payload = encode(&ControlEnvelope::Message {
        content: text.to_string(),
    })?;
    transport.send(payload).await
}
