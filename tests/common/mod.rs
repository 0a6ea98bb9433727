//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use beacon_avatar::session::{Connector, MediaSubsystem};
use beacon_avatar::signal::SAMPLE_RATE;
use beacon_avatar::{AvatarSession, Config, Error, Result, SampleSource, SampleWindow, Transport};

/// Create a session with default configuration
#[must_use]
pub fn test_session() -> Arc<AvatarSession> {
    Arc::new(AvatarSession::new(&Config::default()))
}

/// A window whose samples and bins all sit at `amplitude`
///
/// For `amplitude <= 1/3` the blended raw level is `1.7 * amplitude`; above
/// that it is `0.35 + 0.65 * amplitude`.
#[must_use]
pub fn flat_window(amplitude: f32) -> SampleWindow {
    SampleWindow::new(vec![amplitude; 256], vec![amplitude; 128])
}

/// Generate sine wave audio samples
#[must_use]
pub fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[must_use]
pub fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// Transport that records payloads and can be told to fail
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<Vec<u8>>>,
    pub texts: Mutex<Vec<(String, String)>>,
    pub fail: bool,
    pub text_streams: bool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_text_streams() -> Self {
        Self {
            text_streams: true,
            ..Self::default()
        }
    }

    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).unwrap())
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, payload: Vec<u8>) -> Result<()> {
        if self.fail {
            return Err(Error::Transport("channel closed".to_string()));
        }
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }

    fn supports_text_streams(&self) -> bool {
        self.text_streams
    }

    async fn send_text(&self, topic: &str, text: &str) -> Result<()> {
        if self.fail {
            return Err(Error::Transport("channel closed".to_string()));
        }
        self.texts
            .lock()
            .unwrap()
            .push((topic.to_string(), text.to_string()));
        Ok(())
    }
}

/// How a [`ScriptedConnector`] resolves
#[derive(Clone)]
pub enum ConnectOutcome {
    Succeed,
    Fail(String),
    Hang,
}

/// Connector with a fixed outcome
pub struct ScriptedConnector {
    pub outcome: ConnectOutcome,
}

impl ScriptedConnector {
    pub const fn new(outcome: ConnectOutcome) -> Self {
        Self { outcome }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&mut self) -> Result<()> {
        match &self.outcome {
            ConnectOutcome::Succeed => Ok(()),
            ConnectOutcome::Fail(reason) => Err(Error::Connection(reason.clone())),
            ConnectOutcome::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

/// Sample source replaying a fixed window and counting reads and closes
pub struct ScriptedSource {
    window: SampleWindow,
    pub reads: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl SampleSource for ScriptedSource {
    fn read(&mut self) -> Option<SampleWindow> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Some(self.window.clone())
    }

    fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Err(Error::Audio("audio context already closed".to_string()))
    }
}

/// Media subsystem handing out [`ScriptedSource`]s, or refusing analysis
pub struct ScriptedMedia {
    pub window: SampleWindow,
    pub analysis_available: bool,
    pub attached: Arc<Mutex<Vec<String>>>,
    pub reads: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl ScriptedMedia {
    pub fn new(window: SampleWindow) -> Self {
        Self {
            window,
            analysis_available: true,
            attached: Arc::default(),
            reads: Arc::default(),
            closes: Arc::default(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            analysis_available: false,
            ..Self::new(SampleWindow::default())
        }
    }
}

impl MediaSubsystem for ScriptedMedia {
    type Track = String;

    fn attach_remote_audio(&mut self, participant_id: &str) -> Result<String> {
        self.attached.lock().unwrap().push(participant_id.to_string());
        Ok(participant_id.to_string())
    }

    fn create_analyzer(&mut self, _track: String) -> Result<Box<dyn SampleSource>> {
        if !self.analysis_available {
            return Err(Error::Audio("audio graph access blocked".to_string()));
        }
        Ok(Box::new(ScriptedSource {
            window: self.window.clone(),
            reads: Arc::clone(&self.reads),
            closes: Arc::clone(&self.closes),
        }))
    }
}
