//! Beacon Avatar - signal fusion and state engine for voice-agent avatars
//!
//! Turns a remote agent's audio and control messages into a small,
//! continuously updated state for an animated avatar:
//! - Audio analysis (RMS, peak, spectrum) sampled once per frame
//! - Fusion with a fallback speaking flag into one smoothed level
//! - A robot behavior state machine and a heuristic emotional state
//! - A transcript of chat messages exchanged with the agent
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Session subsystem / media               │
//! │   lifecycle events │ audio tracks │ data payloads    │
//! └────────────┬───────────────┬───────────────┬────────┘
//!              │               │               │
//! ┌────────────▼───┐  ┌────────▼────────┐  ┌───▼────────┐
//! │ FallbackActivity│  │  SampleSource   │  │  protocol  │
//! └────────────┬───┘  └────────┬────────┘  └───┬────────┘
//!              │   frame loop  │               │
//! ┌────────────▼───────────────▼───────────────▼────────┐
//! │                   AvatarSession                      │
//! │  FusionEngine │ RobotStateMachine │ Emotion │ Transcript
//! └────────────────────────┬────────────────────────────┘
//!                          │ AvatarSnapshot (watch)
//! ┌────────────────────────▼────────────────────────────┐
//! │            Renderer  /  /ws/avatar feed              │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod emotion;
pub mod error;
pub mod fallback;
pub mod fusion;
pub mod protocol;
pub mod robot;
pub mod session;
pub mod signal;
pub mod transcript;

pub use config::Config;
pub use emotion::{EmotionClassifier, EmotionalState};
pub use error::{Error, Result};
pub use fallback::FallbackActivity;
pub use fusion::{FusedState, FusionEngine, LevelSource};
pub use protocol::{ControlEnvelope, Transport};
pub use robot::{RobotEvent, RobotState, RobotStateMachine};
pub use session::{AvatarRuntime, AvatarSession, AvatarSnapshot, SessionEvent, TrackKind};
pub use signal::{SampleSource, SampleWindow, SignalMetrics};
pub use transcript::{Message, Role, Transcript};
