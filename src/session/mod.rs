//! Avatar session state
//!
//! One owned struct holds everything the renderer reads. There are two
//! update entry points, one per concurrency domain:
//!
//! - [`AvatarSession::dispatch`] for the event domain (connection lifecycle,
//!   speaking notifications, inbound control messages)
//! - [`AvatarSession::tick`] for the frame loop
//!
//! Both take the same lock and finish by publishing a whole
//! [`AvatarSnapshot`] through a watch channel, so readers never observe a
//! half-applied update.

mod frame_loop;
mod runtime;

pub use frame_loop::FrameLoop;
pub use runtime::{AvatarRuntime, Connector, MediaSubsystem};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;

use crate::config::Config;
use crate::emotion::{EmotionClassifier, EmotionalState};
use crate::fallback::FallbackActivity;
use crate::fusion::{FusedState, FusionEngine};
use crate::protocol::{self, ControlEnvelope, Transport};
use crate::robot::{RobotEvent, RobotState, RobotStateMachine};
use crate::signal::{MetricExtractor, SampleWindow};
use crate::transcript::{Message, Role, Transcript};
use crate::Result;

/// Everything the renderer needs for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AvatarSnapshot {
    /// Fused audio output
    pub fused: FusedState,
    /// Behavioral state
    pub robot: RobotState,
    /// Emotional expression
    pub emotion: EmotionalState,
}

/// Kind of a subscribed media track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

/// Notifications from the session subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A connection attempt began
    ConnectStarted,
    /// The session is established
    Connected,
    /// The connection attempt failed
    ConnectFailed {
        /// Human-readable cause
        reason: String,
    },
    /// The session ended
    Disconnected,
    /// A participant's track became available
    TrackSubscribed {
        /// Publishing participant
        participant_id: String,
        /// Track kind
        kind: TrackKind,
    },
    /// The set of currently speaking participants changed
    ActiveSpeakersChanged {
        /// Participants now speaking
        participant_ids: Vec<String>,
    },
    /// The remote peer started speaking
    SpeakingStarted,
    /// The remote peer stopped speaking
    SpeakingStopped,
    /// A data-channel payload arrived
    Data {
        /// Sending participant
        sender: String,
        /// Raw payload
        payload: Vec<u8>,
    },
    /// A text stream arrived
    TextStream {
        /// Sending participant
        sender: String,
        /// Stream topic, if any
        topic: Option<String>,
        /// Full stream text
        text: String,
    },
}

struct SessionCore {
    fusion: FusionEngine,
    robot: RobotStateMachine,
    emotion: EmotionClassifier,
    transcript: Transcript,
    started_at: Instant,
    accepting_frames: bool,
}

impl SessionCore {
    fn snapshot(&self) -> AvatarSnapshot {
        AvatarSnapshot {
            fused: self.fusion.state(),
            robot: self.robot.state(),
            emotion: self.emotion.state(),
        }
    }

    fn append_inbound(&mut self, sender: &str, local_identity: &str, content: &str) {
        let message = Message::new(Role::from_sender(sender, local_identity), content);
        tracing::debug!(id = %message.id, role = ?message.role, "transcript entry received");
        self.emotion.observe_message(content);
        self.transcript.push(message);
    }
}

/// Owned state of one avatar session
pub struct AvatarSession {
    identity: String,
    extractor: MetricExtractor,
    fallback: Arc<FallbackActivity>,
    core: Mutex<SessionCore>,
    snapshot: watch::Sender<AvatarSnapshot>,
}

impl AvatarSession {
    /// Create a session in its initial state
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let (snapshot, _) = watch::channel(AvatarSnapshot::default());
        Self {
            identity: config.session.identity.clone(),
            extractor: MetricExtractor::new(config.analysis.rms_gain),
            fallback: Arc::new(FallbackActivity::new()),
            core: Mutex::new(SessionCore {
                fusion: FusionEngine::new(config.fusion),
                robot: RobotStateMachine::new(),
                emotion: EmotionClassifier::new(),
                transcript: Transcript::new(),
                started_at: Instant::now(),
                accepting_frames: true,
            }),
            snapshot,
        }
    }

    /// Identity of the local participant
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Shared fallback activity flag
    #[must_use]
    pub fn fallback(&self) -> Arc<FallbackActivity> {
        Arc::clone(&self.fallback)
    }

    /// Latest published snapshot
    #[must_use]
    pub fn snapshot(&self) -> AvatarSnapshot {
        *self.snapshot.borrow()
    }

    /// Subscribe to snapshot updates
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AvatarSnapshot> {
        self.snapshot.subscribe()
    }

    /// Copy of the transcript in insertion order
    #[must_use]
    pub fn transcript(&self) -> Vec<Message> {
        self.core().transcript.messages().to_vec()
    }

    /// Number of transcript entries
    #[must_use]
    pub fn transcript_len(&self) -> usize {
        self.core().transcript.len()
    }

    /// Event-domain entry point
    pub fn dispatch(&self, event: SessionEvent) {
        match event {
            SessionEvent::Disconnected => {
                tracing::info!("session disconnected");
                self.reset();
            }
            SessionEvent::ActiveSpeakersChanged { participant_ids } => {
                self.fallback.set_from_speakers(&participant_ids, &self.identity);
            }
            SessionEvent::SpeakingStarted => self.fallback.set_active(true),
            SessionEvent::SpeakingStopped => self.fallback.set_active(false),
            SessionEvent::TrackSubscribed {
                participant_id,
                kind,
            } => {
                tracing::debug!(participant_id, ?kind, "track subscribed");
            }
            SessionEvent::Data { sender, payload } => self.handle_payload(&sender, &payload),
            SessionEvent::TextStream {
                sender,
                topic,
                text,
            } => self.handle_text_stream(&sender, topic.as_deref(), &text),
            SessionEvent::ConnectStarted => self.update(|core| {
                core.accepting_frames = true;
                core.robot.apply(RobotEvent::ConnectStarted);
            }),
            SessionEvent::Connected => {
                tracing::info!(identity = %self.identity, "session connected");
                self.update(|core| {
                    core.accepting_frames = true;
                    core.started_at = Instant::now();
                    core.robot.apply(RobotEvent::Connected);
                });
            }
            SessionEvent::ConnectFailed { reason } => {
                tracing::warn!(reason, "connection attempt failed");
                self.update(|core| {
                    core.robot.apply(RobotEvent::ConnectFailed);
                });
            }
        }
    }

    /// Decode and apply an inbound control payload
    ///
    /// Undecodable payloads are dropped without any state change.
    pub fn handle_payload(&self, sender: &str, payload: &[u8]) {
        let Some(envelope) = protocol::decode(payload) else {
            return;
        };
        self.update(|core| match envelope {
            ControlEnvelope::Message { content } => {
                core.append_inbound(sender, &self.identity, &content);
            }
            ControlEnvelope::State { state } => {
                core.robot.apply(RobotEvent::Remote(state));
            }
            ControlEnvelope::Emotion { emotion } => core.emotion.set(emotion),
        });
    }

    /// Apply an inbound chat text stream
    pub fn handle_text_stream(&self, sender: &str, topic: Option<&str>, text: &str) {
        let Some(text) = protocol::accept_text_stream(topic, text) else {
            return;
        };
        self.update(|core| core.append_inbound(sender, &self.identity, text));
    }

    /// Frame-domain entry point
    ///
    /// A missing window counts as a raw level of zero. Ticks arriving after
    /// teardown are ignored.
    pub fn tick(&self, window: Option<&SampleWindow>) -> FusedState {
        let metrics = window.map(|w| self.extractor.extract(w));
        let fallback_active = self.fallback.is_active();

        let mut core = self.core();
        if !core.accepting_frames {
            return core.fusion.state();
        }

        let elapsed = core.started_at.elapsed();
        let output = core.fusion.tick(metrics.as_ref(), fallback_active, elapsed);

        if let Some(speaking) = output.speaking_changed {
            core.robot.apply(RobotEvent::SpeakingChanged(speaking));
            if !speaking {
                let robot = core.robot.state();
                core.emotion.speaking_stopped(robot);
            }
        }
        if output.state.is_speaking {
            core.emotion.observe_level(output.state.audio_level);
        }

        self.publish(&core);
        output.state
    }

    /// Send user-authored text, appending it to the transcript optimistically
    ///
    /// The entry is removed again if the transport fails.
    ///
    /// # Errors
    ///
    /// Returns the transport error after rolling back
    pub async fn send_text(&self, transport: &dyn Transport, text: &str) -> Result<Message> {
        let message = Message::new(Role::User, text);
        self.core().transcript.push(message.clone());

        if let Err(e) = protocol::send_user_text(transport, text).await {
            tracing::warn!(id = %message.id, error = %e, "send failed, rolling back transcript entry");
            self.core().transcript.remove(&message.id);
            return Err(e);
        }

        Ok(message)
    }

    /// Return every slice to its initial value
    ///
    /// Also stops accepting frame ticks until the next connection.
    pub fn reset(&self) {
        self.fallback.set_active(false);
        self.update(|core| {
            core.accepting_frames = false;
            core.fusion.reset();
            core.robot.reset();
            core.emotion.reset();
            core.transcript.clear();
        });
    }

    fn update(&self, apply: impl FnOnce(&mut SessionCore)) {
        let mut core = self.core();
        apply(&mut core);
        self.publish(&core);
    }

    fn publish(&self, core: &SessionCore) {
        let next = core.snapshot();
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn core(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> AvatarSession {
        AvatarSession::new(&Config::default())
    }

    #[test]
    fn starts_idle_and_neutral() {
        let session = session();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.robot, RobotState::Idle);
        assert_eq!(snapshot.emotion, EmotionalState::Neutral);
        assert_eq!(snapshot.fused, FusedState::default());
    }

    #[test]
    fn role_derives_from_sender() {
        let session = session();
        session.handle_payload(
            crate::config::DEFAULT_IDENTITY,
            br#"{"type":"message","content":"from me"}"#,
        );
        session.handle_payload("agent", br#"{"type":"message","content":"from agent"}"#);

        assert_eq!(session.transcript_len(), 2);
        let transcript = session.transcript();
        assert_eq!(transcript[0].role, Role::User);
        assert_eq!(transcript[1].role, Role::Assistant);
    }

    #[test]
    fn ticks_after_reset_are_ignored() {
        let session = session();
        session.dispatch(SessionEvent::Connected);
        session.reset();

        let loud = SampleWindow::new(vec![0.8; 256], vec![0.8; 128]);
        let fused = session.tick(Some(&loud));
        assert_eq!(fused, FusedState::default());
        assert_eq!(session.snapshot().robot, RobotState::Idle);
    }

    #[tokio::test]
    async fn subscribers_see_whole_snapshots() {
        let session = session();
        let mut rx = session.subscribe();
        session.dispatch(SessionEvent::Connected);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().robot, RobotState::Listening);
    }
}
