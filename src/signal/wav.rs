//! WAV file playback as a sample source
//!
//! Used to replay recorded agent audio through the engine at frame rate.

use std::path::Path;

use super::{Analyzer, SampleSource, SampleWindow};
use crate::config::AnalysisConfig;
use crate::{Error, Result};

/// Sample source stepping through a decoded WAV file
pub struct WavSource {
    samples: Vec<f32>,
    sample_rate: u32,
    cursor: usize,
    hop: usize,
    analyzer: Analyzer,
}

impl WavSource {
    /// Open a WAV file, downmixing to mono
    ///
    /// `fps` determines how many samples each read advances.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or decoded
    #[allow(clippy::cast_precision_loss)]
    pub fn open(path: &Path, fps: u32, config: &AnalysisConfig) -> Result<Self> {
        let reader = hound::WavReader::open(path).map_err(|e| Error::Audio(e.to_string()))?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| Error::Audio(e.to_string()))?
            }
        };

        tracing::debug!(
            path = %path.display(),
            sample_rate = spec.sample_rate,
            channels,
            samples = interleaved.len(),
            "wav source opened"
        );

        Ok(Self::from_samples(
            downmix(&interleaved, channels),
            spec.sample_rate,
            fps,
            config,
        ))
    }

    /// Build a source from mono samples already in memory
    #[must_use]
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, fps: u32, config: &AnalysisConfig) -> Self {
        let hop = (sample_rate / fps.max(1)).max(1) as usize;
        Self {
            samples,
            sample_rate,
            cursor: 0,
            hop,
            analyzer: Analyzer::new(config),
        }
    }

    /// Sample rate of the decoded audio
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Whether every sample has been consumed
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.samples.len()
    }
}

impl SampleSource for WavSource {
    fn read(&mut self) -> Option<SampleWindow> {
        if self.is_finished() {
            return None;
        }
        self.cursor = (self.cursor + self.hop).min(self.samples.len());
        Some(self.analyzer.analyze(&self.samples[..self.cursor]))
    }
}

#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
