//! Fixed-size spectrum analysis
//!
//! Turns the most recent `fft_size` time-domain samples into a
//! [`SampleWindow`]: the samples themselves plus `fft_size / 2` frequency bins
//! mapped from decibels onto [0, 1].

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::{SampleWindow, finite_or_zero};
use crate::config::AnalysisConfig;

/// Spectrum analyzer with a fixed buffer size per tick
pub struct Analyzer {
    fft: Arc<dyn Fft<f32>>,
    hann_window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    fft_size: usize,
    min_decibels: f32,
    max_decibels: f32,
}

impl Analyzer {
    /// Create an analyzer for the given configuration
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(config: &AnalysisConfig) -> Self {
        let fft_size = config.fft_size.max(2);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        let hann_window = (0..fft_size)
            .map(|n| {
                0.5 * (1.0
                    - (2.0 * std::f32::consts::PI * n as f32 / (fft_size - 1) as f32).cos())
            })
            .collect();

        tracing::debug!(fft_size, bins = fft_size / 2, "spectrum analyzer initialized");

        Self {
            fft,
            hann_window,
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            fft_size,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
        }
    }

    /// Number of time-domain samples consumed per window
    #[must_use]
    pub const fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of frequency bins produced per window
    #[must_use]
    pub const fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Analyze the trailing `fft_size` samples
    ///
    /// Shorter input is zero-padded at the front so the newest sample is
    /// always last. Non-finite samples are read as silence.
    #[allow(clippy::cast_precision_loss)]
    pub fn analyze(&mut self, samples: &[f32]) -> SampleWindow {
        let start = samples.len().saturating_sub(self.fft_size);
        let recent = &samples[start..];
        let padding = self.fft_size - recent.len();

        let mut time_domain = vec![0.0f32; padding];
        time_domain.extend(recent.iter().map(|&s| finite_or_zero(s).clamp(-1.0, 1.0)));

        for (slot, (sample, weight)) in self
            .scratch
            .iter_mut()
            .zip(time_domain.iter().zip(self.hann_window.iter()))
        {
            *slot = Complex::new(sample * weight, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let range = self.max_decibels - self.min_decibels;
        let frequency = self.scratch[..self.bin_count()]
            .iter()
            .map(|c| {
                let magnitude = c.norm() / self.fft_size as f32;
                let db = 20.0 * magnitude.max(f32::MIN_POSITIVE).log10();
                ((db - self.min_decibels) / range).clamp(0.0, 1.0)
            })
            .collect();

        SampleWindow::new(time_domain, frequency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::cast_precision_loss)]
    fn sine(frequency: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.01 * (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn window_has_fixed_shape() {
        let mut analyzer = Analyzer::new(&AnalysisConfig::default());
        let window = analyzer.analyze(&[0.1; 10]);
        assert_eq!(window.time_domain.len(), 256);
        assert_eq!(window.frequency.len(), 128);
        // zero-padded at the front, newest last
        assert!(window.time_domain[0].abs() < f32::EPSILON);
        assert!((window.time_domain[255] - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn silence_maps_to_empty_spectrum() {
        let mut analyzer = Analyzer::new(&AnalysisConfig::default());
        let window = analyzer.analyze(&[0.0; 256]);
        assert!(window.frequency.iter().all(|&b| b.abs() < f32::EPSILON));
    }

    #[test]
    fn tone_peaks_in_matching_bin() {
        let mut analyzer = Analyzer::new(&AnalysisConfig::default());
        // 16kHz / 256 = 62.5 Hz per bin; 2000 Hz lands in bin 32
        let window = analyzer.analyze(&sine(2000.0, 16_000.0, 256));
        let dominant = window
            .frequency
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(dominant, 32);
        assert!(window.frequency.iter().all(|b| (0.0..=1.0).contains(b)));
    }
}
