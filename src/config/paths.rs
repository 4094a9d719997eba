//! Cross-platform settings location using the `dirs` crate.
//!
//! Config dir:
//!   Windows: %APPDATA%\sound-trigger\
//!   macOS:   ~/Library/Application Support/sound-trigger/
//!   Linux:   ~/.config/sound-trigger/

use std::path::{Path, PathBuf};

/// Resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory holding `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "sound-trigger";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");

        Self {
            config_dir,
            settings_file,
        }
    }

    /// Where a data file named in the settings (the etalon) is looked up.
    ///
    /// Absolute paths and paths that exist relative to the working directory
    /// are used as given; anything else is taken relative to `config_dir`.
    pub fn resolve_data_file(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            return path.to_path_buf();
        }
        let beside_settings = self.config_dir.join(path);
        if beside_settings.exists() {
            beside_settings
        } else {
            path.to_path_buf()
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
