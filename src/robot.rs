//! Robot state machine
//!
//! Discrete behavioral state of the avatar, driven by connection lifecycle,
//! the fused speaking flag, and explicit state messages from the remote peer.

use serde::{Deserialize, Serialize};

/// Behavioral state of the avatar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotState {
    /// No session
    #[default]
    Idle,
    /// Connected and waiting
    Listening,
    /// Remote peer is reasoning
    Thinking,
    /// Remote peer audio is audible
    Speaking,
    /// Connection attempt in flight
    Processing,
    /// Connection attempt failed
    Error,
}

impl RobotState {
    /// States that only connection events or explicit messages may leave
    #[must_use]
    pub const fn is_guarded(self) -> bool {
        matches!(self, Self::Processing | Self::Error)
    }
}

impl std::fmt::Display for RobotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
            Self::Processing => "processing",
            Self::Error => "error",
        };
        f.pad(name)
    }
}

/// Inputs that can move the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotEvent {
    /// A connection attempt began
    ConnectStarted,
    /// The session connected
    Connected,
    /// The connection attempt failed, timed out or was cancelled
    ConnectFailed,
    /// The session ended
    Disconnected,
    /// The fused speaking flag flipped
    SpeakingChanged(bool),
    /// The remote peer stated its state explicitly
    Remote(RobotState),
}

/// A state change produced by [`RobotStateMachine::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the event
    pub from: RobotState,
    /// State after the event
    pub to: RobotState,
}

/// Finite state machine over [`RobotState`]
///
/// Starts in `Idle`, has no terminal state, and returns to `Idle` on disconnect.
#[derive(Debug, Clone, Default)]
pub struct RobotStateMachine {
    state: RobotState,
}

impl RobotStateMachine {
    /// Create a machine in `Idle`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RobotState::Idle,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> RobotState {
        self.state
    }

    /// Apply an event, returning the transition if the state changed
    ///
    /// The fused speaking signal never moves the machine out of `Processing`
    /// or `Error`; a stop-speaking edge only leaves `Speaking`.
    pub fn apply(&mut self, event: RobotEvent) -> Option<Transition> {
        let from = self.state;
        let to = match event {
            RobotEvent::Connected => RobotState::Listening,
            RobotEvent::Disconnected => RobotState::Idle,
            RobotEvent::ConnectStarted => RobotState::Processing,
            RobotEvent::ConnectFailed => RobotState::Error,
            RobotEvent::SpeakingChanged(_) if from.is_guarded() => from,
            RobotEvent::SpeakingChanged(true) => RobotState::Speaking,
            RobotEvent::SpeakingChanged(false) if from == RobotState::Speaking => {
                RobotState::Listening
            }
            RobotEvent::SpeakingChanged(false) => from,
            RobotEvent::Remote(state) => state,
        };

        if to == from {
            return None;
        }

        self.state = to;
        tracing::debug!(from = %from, to = %to, ?event, "robot state changed");
        Some(Transition { from, to })
    }

    /// Return to `Idle`
    pub const fn reset(&mut self) {
        self.state = RobotState::Idle;
    }
}
