//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon-avatar/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AvatarConfigFile {
    /// Signal fusion tuning
    #[serde(default)]
    pub fusion: FusionFileConfig,

    /// Sample analysis configuration
    #[serde(default)]
    pub analysis: AnalysisFileConfig,

    /// Session configuration
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Server configuration
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Signal fusion tuning
#[derive(Debug, Default, Deserialize)]
pub struct FusionFileConfig {
    /// Exponential smoothing factor applied to the raw level
    pub smoothing: Option<f32>,

    /// Level above which the avatar starts speaking
    pub enter_threshold: Option<f32>,

    /// Level below which the avatar stops speaking
    pub exit_threshold: Option<f32>,

    /// Raw level under which analysis is considered silent
    pub silence_floor: Option<f32>,

    /// Multiplier applied to the normalized dominant bin
    pub frequency_scale: Option<f32>,

    /// Lower bound of the synthesized fallback level
    pub synthesized_min: Option<f32>,

    /// Upper bound of the synthesized fallback level
    pub synthesized_max: Option<f32>,

    /// Angular rate of the synthesized waveform (rad/s)
    pub synthesized_rate: Option<f32>,
}

/// Sample analysis configuration
#[derive(Debug, Default, Deserialize)]
pub struct AnalysisFileConfig {
    /// FFT window size in samples
    pub fft_size: Option<usize>,

    /// Gain applied to the RMS amplitude
    pub rms_gain: Option<f32>,

    /// Magnitude mapped to 0.0 in the frequency bins
    pub min_decibels: Option<f32>,

    /// Magnitude mapped to 1.0 in the frequency bins
    pub max_decibels: Option<f32>,
}

/// Session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Identity of the local participant
    pub identity: Option<String>,

    /// Frame loop rate in ticks per second
    pub fps: Option<u32>,

    /// Connection attempt bound in milliseconds
    pub connect_timeout_ms: Option<u64>,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// WebSocket server port
    pub port: Option<u16>,
}

/// Load the TOML config file from the standard path
///
/// Returns `AvatarConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> AvatarConfigFile {
    config_file_path().map_or_else(AvatarConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Returns `AvatarConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file_from(path: &Path) -> AvatarConfigFile {
    if !path.exists() {
        return AvatarConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AvatarConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AvatarConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/beacon-avatar/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon-avatar")
            .join("config.toml")
    })
}
