//! Display-rate frame loop
//!
//! One task per session ticks [`AvatarSession::tick`] at the configured
//! period. Sample sources arrive over a command channel once a remote audio
//! track is available; until then ticks run with no window.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::AvatarSession;
use crate::signal::SampleSource;
use crate::{Error, Result};

enum FrameCommand {
    Attach(Box<dyn SampleSource>),
    Stop,
}

/// Handle to a running frame loop
pub struct FrameLoop {
    commands: mpsc::Sender<FrameCommand>,
    handle: JoinHandle<()>,
}

impl FrameLoop {
    /// Spawn the loop on the current runtime
    #[must_use]
    pub fn spawn(session: Arc<AvatarSession>, period: Duration) -> Self {
        let (commands, rx) = mpsc::channel(4);
        let handle = tokio::spawn(run(session, period, rx));
        tracing::debug!(?period, "frame loop started");
        Self { commands, handle }
    }

    /// Feed the loop from a new sample source, releasing any previous one
    ///
    /// # Errors
    ///
    /// Returns error if the loop has already exited; the source is released
    pub async fn attach(&self, source: Box<dyn SampleSource>) -> Result<()> {
        if let Err(mpsc::error::SendError(command)) =
            self.commands.send(FrameCommand::Attach(source)).await
        {
            if let FrameCommand::Attach(source) = command {
                release(source);
            }
            return Err(Error::Audio("frame loop is not running".to_string()));
        }
        Ok(())
    }

    /// Whether the loop task is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the loop and wait for it to exit
    ///
    /// No tick runs after this returns.
    pub async fn stop(self) {
        // A closed channel means the task is already on its way out
        let _ = self.commands.send(FrameCommand::Stop).await;
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "frame loop task failed");
        }
        tracing::debug!("frame loop stopped");
    }
}

async fn run(
    session: Arc<AvatarSession>,
    period: Duration,
    mut commands: mpsc::Receiver<FrameCommand>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut source: Option<Box<dyn SampleSource>> = None;

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(FrameCommand::Attach(next)) => {
                    if let Some(previous) = source.replace(next) {
                        release(previous);
                    }
                    tracing::debug!("sample source attached");
                }
                Some(FrameCommand::Stop) | None => break,
            },

            _ = interval.tick() => {
                let window = source.as_mut().and_then(|s| s.read());
                session.tick(window.as_ref());
            }
        }
    }

    if let Some(source) = source {
        release(source);
    }
}

pub(super) fn release(mut source: Box<dyn SampleSource>) {
    if let Err(e) = source.close() {
        tracing::warn!(error = %e, "failed to release sample source");
    }
}
