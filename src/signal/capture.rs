//! Live audio capture feeding the spectrum analyzer

use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use super::{Analyzer, SampleSource, SampleWindow};
use crate::config::AnalysisConfig;
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Upper bound on buffered samples between reads (one second)
const MAX_BUFFERED: usize = SAMPLE_RATE as usize;

type SharedBuffer = Arc<Mutex<Vec<f32>>>;

/// Captures audio from the default input device
///
/// The stream itself stays with the owner; analysis happens on a
/// [`CaptureSource`] that only shares the sample buffer.
pub struct AudioCapture {
    config: StreamConfig,
    buffer: SharedBuffer,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Create a new audio capture instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if capture fails
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device".to_string()))?;

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                        let excess = buf.len().saturating_sub(MAX_BUFFERED);
                        if excess > 0 {
                            buf.drain(..excess);
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Create an analysis source over the captured samples
    #[must_use]
    pub fn source(&self, config: &AnalysisConfig) -> CaptureSource {
        CaptureSource::new(Arc::clone(&self.buffer), Analyzer::new(config))
    }
}

/// Sample source reading the newest captured samples each tick
pub struct CaptureSource {
    buffer: SharedBuffer,
    history: Vec<f32>,
    analyzer: Analyzer,
}

impl CaptureSource {
    fn new(buffer: SharedBuffer, analyzer: Analyzer) -> Self {
        Self {
            buffer,
            history: Vec::new(),
            analyzer,
        }
    }
}

impl SampleSource for CaptureSource {
    fn read(&mut self) -> Option<SampleWindow> {
        {
            let mut buf = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            self.history.append(&mut buf);
        }

        if self.history.is_empty() {
            return None;
        }

        let excess = self.history.len().saturating_sub(self.analyzer.fft_size());
        if excess > 0 {
            self.history.drain(..excess);
        }

        Some(self.analyzer.analyze(&self.history))
    }

    fn close(&mut self) -> Result<()> {
        self.history.clear();
        self.buffer
            .lock()
            .map(|mut buf| buf.clear())
            .map_err(|_| Error::Audio("capture buffer poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_with(samples: Vec<f32>) -> (SharedBuffer, CaptureSource) {
        let buffer = Arc::new(Mutex::new(samples));
        let source = CaptureSource::new(
            Arc::clone(&buffer),
            Analyzer::new(&AnalysisConfig::default()),
        );
        (buffer, source)
    }

    #[test]
    fn no_samples_yet_reads_none() {
        let (_buffer, mut source) = source_with(Vec::new());
        assert!(source.read().is_none());
    }

    #[test]
    fn read_drains_shared_buffer() {
        let (buffer, mut source) = source_with(vec![0.2; 1000]);
        let window = source.read().unwrap();
        assert_eq!(window.time_domain.len(), 256);
        assert!(buffer.lock().unwrap().is_empty());

        // history carries over between ticks
        assert!(source.read().is_some());
    }

    #[test]
    fn close_clears_history() {
        let (_buffer, mut source) = source_with(vec![0.2; 300]);
        let _ = source.read();
        source.close().unwrap();
        assert!(source.read().is_none());
    }
}
