//! Session lifecycle
//!
//! Drives one [`AvatarSession`] through connect, media attach and teardown
//! against the external session and media subsystems.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::frame_loop::release;
use super::{AvatarSession, FrameLoop, SessionEvent, TrackKind};
use crate::config::SessionConfig;
use crate::protocol::Transport;
use crate::signal::SampleSource;
use crate::transcript::Message;
use crate::{Error, Result};

/// Establishes the underlying real-time session
#[async_trait]
pub trait Connector: Send {
    /// Connect, resolving once the session is usable
    async fn connect(&mut self) -> Result<()>;
}

/// Turns subscribed remote audio into sample sources
pub trait MediaSubsystem: Send {
    /// Handle to an attached remote audio track
    type Track: Send;

    /// Attach the given participant's audio for playback
    ///
    /// # Errors
    ///
    /// Returns error if the track cannot be attached
    fn attach_remote_audio(&mut self, participant_id: &str) -> Result<Self::Track>;

    /// Create an analyzer over an attached track
    ///
    /// # Errors
    ///
    /// Returns error if analysis is unavailable
    fn create_analyzer(&mut self, track: Self::Track) -> Result<Box<dyn SampleSource>>;
}

/// Reports `ConnectFailed` if a connection attempt is dropped mid-flight
struct AttemptGuard {
    session: Option<Arc<AvatarSession>>,
}

impl AttemptGuard {
    fn new(session: &Arc<AvatarSession>) -> Self {
        Self {
            session: Some(Arc::clone(session)),
        }
    }

    fn disarm(mut self) {
        self.session = None;
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.dispatch(SessionEvent::ConnectFailed {
                reason: "connection attempt cancelled".to_string(),
            });
        }
    }
}

/// Owns the frame loop and media for one session
pub struct AvatarRuntime<M> {
    session: Arc<AvatarSession>,
    media: M,
    frame_period: Duration,
    connect_timeout: Duration,
    frames: Option<FrameLoop>,
    /// Source created before a frame loop was running
    pending: Option<Box<dyn SampleSource>>,
}

impl<M: MediaSubsystem> AvatarRuntime<M> {
    /// Create a runtime over a session and media subsystem
    #[must_use]
    pub fn new(session: Arc<AvatarSession>, media: M, config: &SessionConfig) -> Self {
        Self {
            session,
            media,
            frame_period: config.frame_period(),
            connect_timeout: config.connect_timeout,
            frames: None,
            pending: None,
        }
    }

    /// The session this runtime drives
    #[must_use]
    pub const fn session(&self) -> &Arc<AvatarSession> {
        &self.session
    }

    /// Whether the frame loop is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.frames.as_ref().is_some_and(FrameLoop::is_running)
    }

    /// Connect within the configured timeout
    ///
    /// Any previous session is torn down first. The attempt shows as
    /// `processing` and ends in exactly one of `listening` or `error`.
    ///
    /// # Errors
    ///
    /// Returns the connector's error, or [`Error::ConnectTimeout`] if the
    /// attempt did not finish in time
    pub async fn connect(&mut self, connector: &mut dyn Connector) -> Result<()> {
        if self.frames.is_some() {
            self.teardown().await;
        }

        self.session.dispatch(SessionEvent::ConnectStarted);
        let guard = AttemptGuard::new(&self.session);
        let outcome = tokio::time::timeout(self.connect_timeout, connector.connect()).await;
        guard.disarm();

        let result = match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::ConnectTimeout(self.connect_timeout)),
        };

        match result {
            Ok(()) => {
                self.session.dispatch(SessionEvent::Connected);
                let frames = FrameLoop::spawn(Arc::clone(&self.session), self.frame_period);
                if let Some(source) = self.pending.take() {
                    match frames.attach(source).await {
                        Ok(()) => tracing::info!("early remote audio attached for analysis"),
                        Err(e) => tracing::warn!(error = %e, "failed to attach sample source"),
                    }
                }
                self.frames = Some(frames);
                Ok(())
            }
            Err(e) => {
                self.session.dispatch(SessionEvent::ConnectFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Route a session event
    ///
    /// Remote audio tracks are attached for analysis; a disconnect tears the
    /// session down. Everything else goes straight to the session.
    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Disconnected => self.disconnect().await,
            SessionEvent::TrackSubscribed {
                participant_id,
                kind: TrackKind::Audio,
            } if participant_id != self.session.identity() => {
                self.attach_audio(&participant_id).await;
                self.session.dispatch(SessionEvent::TrackSubscribed {
                    participant_id,
                    kind: TrackKind::Audio,
                });
            }
            other => self.session.dispatch(other),
        }
    }

    /// Send user-authored text through the session
    ///
    /// # Errors
    ///
    /// Returns the transport error; the transcript entry is rolled back
    pub async fn send_text(&self, transport: &dyn Transport, text: &str) -> Result<Message> {
        self.session.send_text(transport, text).await
    }

    /// Tear the session down and return to `idle`
    pub async fn disconnect(&mut self) {
        self.teardown().await;
        self.session.dispatch(SessionEvent::Disconnected);
    }

    async fn attach_audio(&mut self, participant_id: &str) {
        let source = self
            .media
            .attach_remote_audio(participant_id)
            .and_then(|track| self.media.create_analyzer(track));

        let source = match source {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(
                    participant_id,
                    error = %e,
                    "audio analysis unavailable, relying on speaking events"
                );
                return;
            }
        };

        let Some(frames) = &self.frames else {
            tracing::debug!(participant_id, "no frame loop yet, holding sample source");
            if let Some(previous) = self.pending.replace(source) {
                release(previous);
            }
            return;
        };
        match frames.attach(source).await {
            Ok(()) => tracing::info!(participant_id, "remote audio attached for analysis"),
            Err(e) => tracing::warn!(participant_id, error = %e, "failed to attach sample source"),
        }
    }

    async fn teardown(&mut self) {
        if let Some(frames) = self.frames.take() {
            frames.stop().await;
        }
        if let Some(source) = self.pending.take() {
            release(source);
        }
        self.session.reset();
    }
}
