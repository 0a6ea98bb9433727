//! Control protocol integration tests

use beacon_avatar::protocol::{self, CHAT_TOPIC, ControlEnvelope};
use beacon_avatar::{EmotionalState, RobotState, Transport};
use tokio_test::assert_ok;

mod common;
use common::RecordingTransport;

#[test]
fn test_every_robot_state_decodes() {
    for (name, state) in [
        ("idle", RobotState::Idle),
        ("listening", RobotState::Listening),
        ("thinking", RobotState::Thinking),
        ("speaking", RobotState::Speaking),
        ("processing", RobotState::Processing),
        ("error", RobotState::Error),
    ] {
        let payload = format!(r#"{{"type":"state","state":"{name}"}}"#);
        assert_eq!(
            protocol::decode(payload.as_bytes()),
            Some(ControlEnvelope::State { state }),
            "state {name}"
        );
    }
}

#[test]
fn test_every_emotion_decodes() {
    for (name, emotion) in [
        ("neutral", EmotionalState::Neutral),
        ("happy", EmotionalState::Happy),
        ("thinking", EmotionalState::Thinking),
        ("confused", EmotionalState::Confused),
        ("surprised", EmotionalState::Surprised),
    ] {
        let payload = format!(r#"{{"type":"emotion","emotion":"{name}"}}"#);
        assert_eq!(
            protocol::decode(payload.as_bytes()),
            Some(ControlEnvelope::Emotion { emotion }),
            "emotion {name}"
        );
    }
}

#[test]
fn test_extra_fields_are_tolerated() {
    let decoded = protocol::decode(br#"{"type":"message","content":"hi","id":"abc","ts":1}"#);
    assert_eq!(
        decoded,
        Some(ControlEnvelope::Message {
            content: "hi".to_string()
        })
    );
}

#[test]
fn test_wrong_field_types_are_dropped() {
    assert!(protocol::decode(br#"{"type":"message","content":42}"#).is_none());
    assert!(protocol::decode(br#"{"type":"message"}"#).is_none());
    assert!(protocol::decode(b"").is_none());
}

#[tokio::test]
async fn test_user_text_goes_out_as_message_envelope() {
    let transport = RecordingTransport::default();
    assert_ok!(protocol::send_user_text(&transport, "what's up?").await);

    let sent = transport.sent.lock().unwrap();
    assert_eq!(
        protocol::decode(&sent[0]),
        Some(ControlEnvelope::Message {
            content: "what's up?".to_string()
        })
    );
}

#[tokio::test]
async fn test_user_text_uses_chat_topic_when_streams_exist() {
    let transport = RecordingTransport::with_text_streams();
    assert_ok!(protocol::send_user_text(&transport, "hello").await);

    let texts = transport.texts.lock().unwrap();
    assert_eq!(texts[0].0, CHAT_TOPIC);
    assert_eq!(texts[0].1, "hello");
}

/// Transport relying on the default `send_text`
struct PlainTransport(RecordingTransport);

#[async_trait::async_trait]
impl Transport for PlainTransport {
    async fn send(&self, payload: Vec<u8>) -> beacon_avatar::Result<()> {
        self.0.send(payload).await
    }

    fn supports_text_streams(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn test_default_send_text_wraps_envelope() {
    let transport = PlainTransport(RecordingTransport::default());
    assert_ok!(protocol::send_user_text(&transport, "wrapped").await);

    let sent = transport.0.sent_json();
    assert_eq!(sent[0]["type"], "message");
    assert_eq!(sent[0]["content"], "wrapped");
}
