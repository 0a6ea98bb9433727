//! Audio signal sampling and metric extraction
//!
//! A [`SampleSource`] yields one [`SampleWindow`] per frame tick. The
//! [`MetricExtractor`] reduces a window to [`SignalMetrics`], which the fusion
//! engine blends into a single amplitude estimate.

mod analyzer;
mod capture;
mod wav;

pub use analyzer::Analyzer;
pub use capture::{AudioCapture, CaptureSource, SAMPLE_RATE};
pub use wav::WavSource;

use crate::Result;

/// Weight of the time-domain amplitude in the blended level
const AMPLITUDE_WEIGHT: f32 = 0.7;

/// Weight of the frequency-domain average in the blended level
const SPECTRUM_WEIGHT: f32 = 0.3;

/// One analysis tick worth of samples
///
/// `time_domain` holds samples in [-1, 1]; `frequency` holds bin magnitudes
/// in [0, 1]. Exists only for the duration of one fusion step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleWindow {
    /// Time-domain samples
    pub time_domain: Vec<f32>,
    /// Frequency bin magnitudes
    pub frequency: Vec<f32>,
}

impl SampleWindow {
    /// Create a window from time-domain samples and frequency bins
    #[must_use]
    pub const fn new(time_domain: Vec<f32>, frequency: Vec<f32>) -> Self {
        Self {
            time_domain,
            frequency,
        }
    }
}

/// Scalar metrics derived from one [`SampleWindow`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalMetrics {
    /// Gain-scaled RMS amplitude, clamped to [0, 1]
    pub rms: f32,
    /// Peak absolute amplitude, clamped to [0, 1]
    pub peak: f32,
    /// Mean frequency bin magnitude
    pub freq_average: f32,
    /// Index of the strongest frequency bin
    pub dominant_bin: usize,
    /// Number of frequency bins in the window
    pub bin_count: usize,
}

impl SignalMetrics {
    /// Combined amplitude estimate in [0, 1]
    ///
    /// Time-domain amplitude (mean of RMS and peak) weighted 0.7 against the
    /// spectrum average weighted 0.3.
    #[must_use]
    pub fn level(&self) -> f32 {
        let amplitude = (self.rms + self.peak) / 2.0;
        (AMPLITUDE_WEIGHT * amplitude + SPECTRUM_WEIGHT * self.freq_average).clamp(0.0, 1.0)
    }

    /// Dominant bin as a fraction of the bin count, in [0, 1)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn dominant_fraction(&self) -> f32 {
        if self.bin_count == 0 {
            return 0.0;
        }
        self.dominant_bin as f32 / self.bin_count as f32
    }
}

/// Reduces sample windows to [`SignalMetrics`]
#[derive(Debug, Clone, Copy)]
pub struct MetricExtractor {
    rms_gain: f32,
}

impl Default for MetricExtractor {
    fn default() -> Self {
        Self::new(crate::config::AnalysisConfig::default().rms_gain)
    }
}

impl MetricExtractor {
    /// Create an extractor with the given RMS gain
    #[must_use]
    pub const fn new(rms_gain: f32) -> Self {
        Self { rms_gain }
    }

    /// Extract metrics from a window
    #[must_use]
    pub fn extract(&self, window: &SampleWindow) -> SignalMetrics {
        let rms = (calculate_rms(&window.time_domain) * self.rms_gain).clamp(0.0, 1.0);
        let peak = window
            .time_domain
            .iter()
            .map(|&s| finite_or_zero(s).abs())
            .fold(0.0f32, f32::max)
            .clamp(0.0, 1.0);

        SignalMetrics {
            rms,
            peak,
            freq_average: mean(&window.frequency),
            dominant_bin: argmax(&window.frequency),
            bin_count: window.frequency.len(),
        }
    }
}

/// Produces one sample window per frame tick
///
/// `read` returns `None` when no data is available for this tick; the caller
/// treats that as a raw level of zero rather than waiting.
pub trait SampleSource: Send {
    /// Read the current window
    fn read(&mut self) -> Option<SampleWindow>;

    /// Release the underlying analysis resource
    ///
    /// # Errors
    ///
    /// Returns error if the resource was already gone; callers treat this as best-effort
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|&s| finite_or_zero(s).powi(2)).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// NaN and infinities from a broken source count as silence
pub(crate) fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() { value } else { 0.0 }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().copied().map(finite_or_zero).sum::<f32>() / values.len() as f32
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::MIN), |(best, max), (i, &v)| {
            if v > max { (i, v) } else { (best, max) }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_window_has_zero_metrics() {
        let window = SampleWindow::new(vec![0.0; 64], vec![0.0; 32]);
        let metrics = MetricExtractor::default().extract(&window);
        assert!(metrics.rms.abs() < f32::EPSILON);
        assert!(metrics.peak.abs() < f32::EPSILON);
        assert!(metrics.level().abs() < f32::EPSILON);
        assert_eq!(metrics.bin_count, 32);
    }

    #[test]
    fn rms_is_gain_scaled_and_clamped() {
        let window = SampleWindow::new(vec![0.1; 64], vec![]);
        let metrics = MetricExtractor::new(3.0).extract(&window);
        assert!((metrics.rms - 0.3).abs() < 1e-5);

        let loud = SampleWindow::new(vec![0.9; 64], vec![]);
        let metrics = MetricExtractor::new(3.0).extract(&loud);
        assert!((metrics.rms - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn peak_uses_absolute_value() {
        let window = SampleWindow::new(vec![0.1, -0.7, 0.3], vec![]);
        let metrics = MetricExtractor::default().extract(&window);
        assert!((metrics.peak - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn dominant_bin_is_argmax() {
        let window = SampleWindow::new(vec![], vec![0.1, 0.2, 0.9, 0.4]);
        let metrics = MetricExtractor::default().extract(&window);
        assert_eq!(metrics.dominant_bin, 2);
        assert!((metrics.freq_average - 0.4).abs() < 1e-6);
        assert!((metrics.dominant_fraction() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn level_blends_amplitude_and_spectrum() {
        let metrics = SignalMetrics {
            rms: 0.4,
            peak: 0.6,
            freq_average: 0.5,
            dominant_bin: 0,
            bin_count: 8,
        };
        // 0.7 * 0.5 + 0.3 * 0.5
        assert!((metrics.level() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn non_finite_samples_read_as_silence() {
        let window = SampleWindow::new(
            vec![0.2, f32::NAN, f32::INFINITY, -0.2],
            vec![0.5, f32::NAN, f32::NEG_INFINITY, 0.5],
        );
        let metrics = MetricExtractor::new(1.0).extract(&window);
        assert!(metrics.rms.is_finite());
        assert!((metrics.peak - 0.2).abs() < f32::EPSILON);
        assert!((metrics.freq_average - 0.25).abs() < 1e-6);
        assert!(metrics.level().is_finite());
    }
}
