//! Detector settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and handed to the capture
//! thread and the matcher at construction.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;

/// Environment variable that overrides the settings file location.
pub const CONFIG_ENV_VAR: &str = "SOUND_TRIGGER_CONFIG";

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// How raw correlation values are scaled into a match score.
///
/// | Variant   | Divisor                         | Score at verbatim hit |
/// |-----------|---------------------------------|-----------------------|
/// | Reference | `‖etalon‖ + ε`                  | `‖etalon‖`            |
/// | Windowed  | `‖etalon‖ · ‖window‖ + ε`       | `1.0`                 |
///
/// `Reference` scores grow with the etalon's energy, so a partial overlap can
/// already cross a threshold in `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Divide by the reference L2 norm only.
    Reference,
    /// Full normalized cross-correlation, bounded to `[-1, 1]`.
    Windowed,
}

impl Default for Normalization {
    fn default() -> Self {
        Self::Windowed
    }
}

// ---------------------------------------------------------------------------
// DetectorConfig
// ---------------------------------------------------------------------------

/// Parameters shared by the capture source and the stream matcher.
///
/// Read once at startup; nothing reconfigures a running detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per capture read (one block).
    pub chunk_size: usize,
    /// Match threshold in `(0, 1]`; a score must be strictly greater.
    pub threshold: f32,
    /// JSON file holding the reference waveform.
    pub etalon_file: PathBuf,
    /// Blocks held by the capture queue before the oldest is evicted.
    pub queue_capacity: usize,
    /// Length of the rolling analysis window in seconds.
    pub window_secs: u32,
    /// Consumer back-off when the queue is empty, in milliseconds.
    pub poll_interval_ms: u64,
    /// Score normalization mode.
    pub normalization: Normalization,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            chunk_size: 2_048,
            threshold: 0.8,
            etalon_file: PathBuf::from("etalon.json"),
            queue_capacity: 100,
            window_secs: 2,
            poll_interval_ms: 10,
            normalization: Normalization::default(),
        }
    }
}

impl DetectorConfig {
    /// Channel count of the blocks handed to the matcher. Always mono;
    /// multi-channel devices are downmixed in the capture callback.
    pub const CHANNELS: u16 = 1;

    /// Maximum number of samples kept in the rolling analysis buffer.
    pub fn window_len(&self) -> usize {
        self.sample_rate as usize * self.window_secs as usize
    }

    /// Nominal time covered by one block.
    pub fn block_duration(&self) -> std::time::Duration {
        if self.sample_rate == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_secs_f64(self.chunk_size as f64 / self.sample_rate as f64)
    }

    /// Reject values that would make detection impossible or meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            bail!("detector.sample_rate must be > 0");
        }
        if self.chunk_size == 0 {
            bail!("detector.chunk_size must be > 0");
        }
        if self.queue_capacity == 0 {
            bail!("detector.queue_capacity must be > 0");
        }
        if self.window_secs == 0 {
            bail!("detector.window_secs must be > 0");
        }
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            bail!(
                "detector.threshold must be in (0, 1], got {}",
                self.threshold
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Input device selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Input device name, `None` means the host default.
    pub device: Option<String>,
}

// ---------------------------------------------------------------------------
// ActionConfig
// ---------------------------------------------------------------------------

/// What happens when the etalon is heard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    /// Process name checked before launching (e.g. `"dota2.exe"`).
    pub target_process: String,
    /// Primary executable to launch.
    pub executable: PathBuf,
    /// Tried in order when `executable` does not exist.
    pub fallback_executables: Vec<PathBuf>,
    /// Arguments passed to the launched executable.
    pub args: Vec<String>,
    /// Skip listening entirely when the target is already running at startup.
    pub exit_if_running: bool,
    /// Stop the detector once the action reports it handled the match.
    pub stop_on_handled: bool,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            target_process: "dota2.exe".into(),
            executable: PathBuf::from("dota2.exe"),
            fallback_executables: Vec::new(),
            args: Vec::new(),
            exit_if_running: true,
            stop_on_handled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use sound_trigger::config::AppConfig;
///
/// // Returns Default when the file is missing.
/// let config = AppConfig::load().unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub detector: DetectorConfig,
    pub capture: CaptureConfig,
    pub action: ActionConfig,
}

impl AppConfig {
    /// Load from `$SOUND_TRIGGER_CONFIG` if set, otherwise from the
    /// platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::resolve_path())
    }

    /// Settings file that [`load`](Self::load) reads.
    pub fn resolve_path() -> PathBuf {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => AppPaths::new().settings_file,
        }
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("config: {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.detector.validate()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
