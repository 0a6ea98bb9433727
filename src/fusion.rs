//! Signal fusion
//!
//! Reconciles analyzed audio metrics with the fallback speaking flag into one
//! [`FusedState`] per frame tick: smoothed level, presentational frequency,
//! and a hysteresis-gated speaking decision.

use std::time::Duration;

use serde::Serialize;

use crate::config::FusionConfig;
use crate::signal::SignalMetrics;

/// Canonical per-tick output consumed by the renderer
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FusedState {
    /// Smoothed amplitude in [0, 1]
    pub audio_level: f32,
    /// Presentational frequency, higher means more treble-weighted
    pub frequency: f32,
    /// Hysteresis-gated speaking flag
    pub is_speaking: bool,
}

/// Where a tick's raw level came from
///
/// Only the fusion engine inspects this; everything downstream sees a
/// [`FusedState`] regardless of the variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LevelSource {
    /// Metrics from real sample analysis
    Analyzed(SignalMetrics),
    /// Substitute level while analysis is silent but the peer is speaking
    Synthesized(f32),
    /// Nothing to report this tick
    Silent,
}

impl LevelSource {
    /// Raw level before smoothing
    #[must_use]
    pub fn raw_level(&self) -> f32 {
        match self {
            Self::Analyzed(metrics) => metrics.level(),
            Self::Synthesized(level) => *level,
            Self::Silent => 0.0,
        }
    }
}

/// Result of one fusion tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionOutput {
    /// The new fused state
    pub state: FusedState,
    /// `Some(speaking)` when the speaking flag flipped on this tick
    pub speaking_changed: Option<bool>,
}

/// Signal fusion engine
///
/// Owns the previous tick's state; `tick` replaces it wholesale.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    config: FusionConfig,
    state: FusedState,
}

impl FusionEngine {
    /// Create an engine at rest
    #[must_use]
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            state: FusedState::default(),
        }
    }

    /// The latest fused state
    #[must_use]
    pub const fn state(&self) -> FusedState {
        self.state
    }

    /// Return to the initial state
    pub fn reset(&mut self) {
        self.state = FusedState::default();
    }

    /// Decide which source drives this tick
    ///
    /// Analysis under the silence floor (or absent) is replaced by the
    /// synthesized level while the fallback flag reports speech.
    #[must_use]
    pub fn classify(
        &self,
        metrics: Option<&SignalMetrics>,
        fallback_active: bool,
        elapsed: Duration,
    ) -> LevelSource {
        let raw = metrics.map_or(0.0, SignalMetrics::level);
        if raw < self.config.silence_floor && fallback_active {
            return LevelSource::Synthesized(self.synthesized_level(elapsed));
        }
        metrics.map_or(LevelSource::Silent, |m| LevelSource::Analyzed(*m))
    }

    /// Run one tick from optional metrics and the fallback flag
    pub fn tick(
        &mut self,
        metrics: Option<&SignalMetrics>,
        fallback_active: bool,
        elapsed: Duration,
    ) -> FusionOutput {
        let source = self.classify(metrics, fallback_active, elapsed);
        self.fuse(source)
    }

    /// Fold a classified source into the fused state
    pub fn fuse(&mut self, source: LevelSource) -> FusionOutput {
        let previous = self.state;
        let alpha = self.config.smoothing;

        let raw = source.raw_level();
        let raw = if raw.is_finite() { raw } else { 0.0 };
        let mut level = (alpha * raw + (1.0 - alpha) * previous.audio_level).clamp(0.0, 1.0);
        if matches!(source, LevelSource::Synthesized(_)) {
            level = level.clamp(self.config.synthesized_min, self.config.synthesized_max);
        }

        let is_speaking = if previous.is_speaking {
            level >= self.config.exit_threshold
        } else {
            level > self.config.enter_threshold
        };

        let frequency = match source {
            LevelSource::Analyzed(metrics) => {
                metrics.dominant_fraction() * self.config.frequency_scale
            }
            LevelSource::Synthesized(_) => previous.frequency,
            LevelSource::Silent => 0.0,
        };

        self.state = FusedState {
            audio_level: level,
            frequency,
            is_speaking,
        };

        let speaking_changed = (is_speaking != previous.is_speaking).then_some(is_speaking);
        if let Some(speaking) = speaking_changed {
            tracing::trace!(speaking, level, "fused speaking changed");
        }

        FusionOutput {
            state: self.state,
            speaking_changed,
        }
    }

    /// Smooth periodic stand-in level, bounded to the configured band
    fn synthesized_level(&self, elapsed: Duration) -> f32 {
        let FusionConfig {
            synthesized_min: min,
            synthesized_max: max,
            synthesized_rate: rate,
            ..
        } = self.config;
        (min + (max - min) * (elapsed.as_secs_f32() * rate).sin().abs()).clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics_with_level(level: f32) -> SignalMetrics {
        // rms == peak == freq_average == level gives level() == level
        SignalMetrics {
            rms: level,
            peak: level,
            freq_average: level,
            dominant_bin: 4,
            bin_count: 16,
        }
    }

    #[test]
    fn absent_metrics_without_fallback_is_silent() {
        let engine = FusionEngine::new(FusionConfig::default());
        assert_eq!(
            engine.classify(None, false, Duration::ZERO),
            LevelSource::Silent
        );
    }

    #[test]
    fn quiet_analysis_with_fallback_is_synthesized() {
        let engine = FusionEngine::new(FusionConfig::default());
        let quiet = metrics_with_level(0.001);
        let source = engine.classify(Some(&quiet), true, Duration::from_millis(300));
        let LevelSource::Synthesized(level) = source else {
            panic!("expected synthesized source, got {source:?}");
        };
        assert!((0.2..=0.6).contains(&level));
    }

    #[test]
    fn loud_analysis_is_never_substituted() {
        let engine = FusionEngine::new(FusionConfig::default());
        let loud = metrics_with_level(0.5);
        assert!(matches!(
            engine.classify(Some(&loud), true, Duration::ZERO),
            LevelSource::Analyzed(_)
        ));
    }

    #[test]
    fn smoothing_follows_step_within_three_ticks() {
        let mut engine = FusionEngine::new(FusionConfig::default());
        let step = metrics_with_level(0.5);
        for _ in 0..3 {
            engine.tick(Some(&step), false, Duration::ZERO);
        }
        // 0.5 * (1 - 0.2^3)
        assert!((engine.state().audio_level - 0.496).abs() < 1e-4);
    }

    #[test]
    fn frequency_scales_dominant_fraction() {
        let mut engine = FusionEngine::new(FusionConfig::default());
        let out = engine.tick(Some(&metrics_with_level(0.3)), false, Duration::ZERO);
        // 4 / 16 * 3
        assert!((out.state.frequency - 0.75).abs() < 1e-6);
    }

    #[test]
    fn speaking_edges_are_reported_once() {
        let mut engine = FusionEngine::new(FusionConfig::default());
        let loud = metrics_with_level(0.5);
        let first = engine.tick(Some(&loud), false, Duration::ZERO);
        assert_eq!(first.speaking_changed, Some(true));
        let second = engine.tick(Some(&loud), false, Duration::ZERO);
        assert_eq!(second.speaking_changed, None);
    }

    #[test]
    fn reset_returns_to_rest() {
        let mut engine = FusionEngine::new(FusionConfig::default());
        engine.tick(Some(&metrics_with_level(0.9)), false, Duration::ZERO);
        engine.reset();
        assert_eq!(engine.state(), FusedState::default());
    }
}
