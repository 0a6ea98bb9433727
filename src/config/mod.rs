//! Configuration management for the avatar engine
//!
//! Layering, lowest to highest priority: built-in defaults, the TOML overlay
//! file, environment variables. CLI flags are applied by the binary on top.

pub mod file;

use std::time::Duration;

use crate::{Error, Result};

pub use file::{AvatarConfigFile, config_file_path, load_config_file, load_config_file_from};

/// Default local participant identity
pub const DEFAULT_IDENTITY: &str = "local-user";

/// Default WebSocket server port
pub const DEFAULT_PORT: u16 = 18790;

/// Avatar engine configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Signal fusion tuning
    pub fusion: FusionConfig,

    /// Sample analysis configuration
    pub analysis: AnalysisConfig,

    /// Session configuration
    pub session: SessionConfig,

    /// Server configuration
    pub server: ServerConfig,
}

/// Signal fusion tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionConfig {
    /// Weight of the new raw level in exponential smoothing
    pub smoothing: f32,

    /// Smoothed level above which speaking starts
    pub enter_threshold: f32,

    /// Smoothed level below which speaking stops
    pub exit_threshold: f32,

    /// Raw level treated as silence when deciding on substitution
    pub silence_floor: f32,

    /// Multiplier for the normalized dominant bin
    pub frequency_scale: f32,

    /// Lower bound of the synthesized fallback level
    pub synthesized_min: f32,

    /// Upper bound of the synthesized fallback level
    pub synthesized_max: f32,

    /// Angular rate of the synthesized waveform (rad/s)
    pub synthesized_rate: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.8,
            enter_threshold: 0.05,
            exit_threshold: 0.02,
            silence_floor: 0.01,
            frequency_scale: 3.0,
            synthesized_min: 0.2,
            synthesized_max: 0.6,
            synthesized_rate: 6.0,
        }
    }
}

/// Sample analysis configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisConfig {
    /// FFT window size; half of it is the frequency bin count
    pub fft_size: usize,

    /// Gain applied to the RMS amplitude before clamping
    pub rms_gain: f32,

    /// Magnitude (dBFS) mapped to 0.0
    pub min_decibels: f32,

    /// Magnitude (dBFS) mapped to 1.0
    pub max_decibels: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            rms_gain: 3.0,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Identity of the local participant; senders matching it are the user
    pub identity: String,

    /// Frame loop rate in ticks per second
    pub fps: u32,

    /// Bound on a single connection attempt
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_string(),
            fps: 60,
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl SessionConfig {
    /// Duration of one frame loop tick
    #[must_use]
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

/// Server configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

impl Config {
    /// Load configuration from defaults, the config file and the environment
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load() -> Result<Self> {
        let mut config = Self::from_file(load_config_file());
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from a parsed config file on top of defaults
    #[must_use]
    pub fn from_file(file: AvatarConfigFile) -> Self {
        let mut config = Self::default();

        let fusion = &mut config.fusion;
        let f = file.fusion;
        fusion.smoothing = f.smoothing.unwrap_or(fusion.smoothing);
        fusion.enter_threshold = f.enter_threshold.unwrap_or(fusion.enter_threshold);
        fusion.exit_threshold = f.exit_threshold.unwrap_or(fusion.exit_threshold);
        fusion.silence_floor = f.silence_floor.unwrap_or(fusion.silence_floor);
        fusion.frequency_scale = f.frequency_scale.unwrap_or(fusion.frequency_scale);
        fusion.synthesized_min = f.synthesized_min.unwrap_or(fusion.synthesized_min);
        fusion.synthesized_max = f.synthesized_max.unwrap_or(fusion.synthesized_max);
        fusion.synthesized_rate = f.synthesized_rate.unwrap_or(fusion.synthesized_rate);

        let analysis = &mut config.analysis;
        let a = file.analysis;
        analysis.fft_size = a.fft_size.unwrap_or(analysis.fft_size);
        analysis.rms_gain = a.rms_gain.unwrap_or(analysis.rms_gain);
        analysis.min_decibels = a.min_decibels.unwrap_or(analysis.min_decibels);
        analysis.max_decibels = a.max_decibels.unwrap_or(analysis.max_decibels);

        let s = file.session;
        if let Some(identity) = s.identity {
            config.session.identity = identity;
        }
        config.session.fps = s.fps.unwrap_or(config.session.fps);
        if let Some(ms) = s.connect_timeout_ms {
            config.session.connect_timeout = Duration::from_millis(ms);
        }

        config.server.port = file.server.port.unwrap_or(config.server.port);

        config
    }

    /// Apply `BEACON_AVATAR_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(identity) = std::env::var("BEACON_AVATAR_IDENTITY") {
            if !identity.trim().is_empty() {
                self.session.identity = identity;
            }
        }
        if let Some(port) = env_parse::<u16>("BEACON_AVATAR_PORT") {
            self.server.port = port;
        }
        if let Some(fps) = env_parse::<u32>("BEACON_AVATAR_FPS") {
            self.session.fps = fps;
        }
        if let Some(ms) = env_parse::<u64>("BEACON_AVATAR_CONNECT_TIMEOUT_MS") {
            self.session.connect_timeout = Duration::from_millis(ms);
        }
    }

    /// Reject configurations the engine cannot honour
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        let fusion = &self.fusion;
        if !(fusion.smoothing > 0.0 && fusion.smoothing <= 1.0) {
            return Err(Error::Config(format!(
                "fusion.smoothing must be in (0, 1], got {}",
                fusion.smoothing
            )));
        }
        if fusion.exit_threshold >= fusion.enter_threshold {
            return Err(Error::Config(format!(
                "fusion.exit_threshold ({}) must be below fusion.enter_threshold ({})",
                fusion.exit_threshold, fusion.enter_threshold
            )));
        }
        if fusion.synthesized_min > fusion.synthesized_max
            || fusion.synthesized_min <= fusion.enter_threshold
            || fusion.synthesized_max > 1.0
        {
            return Err(Error::Config(format!(
                "synthesized band [{}, {}] must sit above the enter threshold and within 1.0",
                fusion.synthesized_min, fusion.synthesized_max
            )));
        }
        if self.analysis.fft_size < 32 || !self.analysis.fft_size.is_power_of_two() {
            return Err(Error::Config(format!(
                "analysis.fft_size must be a power of two >= 32, got {}",
                self.analysis.fft_size
            )));
        }
        if self.analysis.min_decibels >= self.analysis.max_decibels {
            return Err(Error::Config(
                "analysis.min_decibels must be below analysis.max_decibels".to_string(),
            ));
        }
        if self.session.fps == 0 {
            return Err(Error::Config("session.fps must be positive".to_string()));
        }
        if self.session.connect_timeout.is_zero() {
            return Err(Error::Config(
                "session.connect_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::{FusionFileConfig, SessionFileConfig};

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.identity, DEFAULT_IDENTITY);
        assert_eq!(config.session.frame_period(), Duration::from_secs(1) / 60);
    }

    #[test]
    fn file_overlay_replaces_only_present_fields() {
        let file = AvatarConfigFile {
            fusion: FusionFileConfig {
                smoothing: Some(0.5),
                ..FusionFileConfig::default()
            },
            session: SessionFileConfig {
                identity: Some("kiosk".to_string()),
                connect_timeout_ms: Some(2500),
                ..SessionFileConfig::default()
            },
            ..AvatarConfigFile::default()
        };

        let config = Config::from_file(file);
        assert!((config.fusion.smoothing - 0.5).abs() < f32::EPSILON);
        assert!((config.fusion.enter_threshold - 0.05).abs() < f32::EPSILON);
        assert_eq!(config.session.identity, "kiosk");
        assert_eq!(config.session.connect_timeout, Duration::from_millis(2500));
        assert_eq!(config.session.fps, 60);
    }

    #[test]
    fn rejects_inverted_hysteresis() {
        let mut config = Config::default();
        config.fusion.exit_threshold = 0.05;
        config.fusion.enter_threshold = 0.02;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_zero_fps_and_bad_fft_size() {
        let mut config = Config::default();
        config.session.fps = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analysis.fft_size = 300;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_synthesized_band_below_enter_threshold() {
        let mut config = Config::default();
        config.fusion.synthesized_min = 0.01;
        assert!(config.validate().is_err());
    }
}
