use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::render::{DEFAULT_POOL_SIZE, DEFAULT_PREFETCH_DEPTH};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "folio";

/// Largest accepted full-page raster scale
const MAX_RENDER_SCALE: f32 = 8.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerSettings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Initial size and soft bound of the slot pool
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Pages after the visible one to decode ahead of time
    #[serde(default = "default_prefetch_depth")]
    pub prefetch_depth: usize,

    /// Minimum horizontal fling velocity that turns the page
    #[serde(default = "default_fling_threshold")]
    pub fling_threshold: f32,

    /// Scale applied to full-page renders
    #[serde(default = "default_render_scale")]
    pub render_scale: f32,

    #[serde(default = "default_geometry_cache_size")]
    pub geometry_cache_size: usize,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_prefetch_depth() -> usize {
    DEFAULT_PREFETCH_DEPTH
}

fn default_fling_threshold() -> f32 {
    100.0
}

fn default_render_scale() -> f32 {
    1.0
}

fn default_geometry_cache_size() -> usize {
    256
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            pool_size: default_pool_size(),
            prefetch_depth: default_prefetch_depth(),
            fling_threshold: default_fling_threshold(),
            render_scale: default_render_scale(),
            geometry_cache_size: default_geometry_cache_size(),
        }
    }
}

fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

impl ViewerSettings {
    /// Load from the platform config directory, writing defaults there if
    /// nothing exists yet.
    pub fn load() -> Self {
        let Some(path) = preferred_config_path() else {
            warn!("Could not determine config directory, using default settings");
            return Self::default();
        };

        if path.exists() {
            return Self::load_from_path(&path);
        }

        info!("Settings file not found, creating with defaults at {path:?}");
        let settings = Self::default();
        settings.save_to_path(&path);
        settings
    }

    /// Read settings from `path`. Read and parse errors are logged and the
    /// defaults are used instead.
    pub fn load_from_path(path: &Path) -> Self {
        let settings = match fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<ViewerSettings>(&content) {
                Ok(settings) => {
                    debug!("Loaded settings from {path:?}");
                    settings
                }
                Err(e) => {
                    error!("Failed to parse settings file {path:?}: {e}");
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read settings file {path:?}: {e}");
                Self::default()
            }
        };

        if settings.version > CURRENT_VERSION {
            warn!(
                "Settings file {path:?} is v{}, newer than v{CURRENT_VERSION}",
                settings.version
            );
        }
        settings.validated()
    }

    pub fn save_to_path(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    error!("Failed to create config directory {parent:?}: {e}");
                    return;
                }
            }
        }

        match fs::write(path, self.to_yaml()) {
            Ok(()) => debug!("Saved settings to {path:?}"),
            Err(e) => error!("Failed to save settings to {path:?}: {e}"),
        }
    }

    fn to_yaml(&self) -> String {
        let mut content = String::new();

        content.push_str(&format!("version: {}\n", self.version));
        content.push_str("# Page slots kept ready; more are created on demand\n");
        content.push_str(&format!("pool_size: {}\n", self.pool_size));
        content.push_str("# Pages after the current one decoded in the background\n");
        content.push_str(&format!("prefetch_depth: {}\n", self.prefetch_depth));
        content.push_str("# Horizontal fling speed needed to turn the page\n");
        content.push_str(&format!("fling_threshold: {:?}\n", self.fling_threshold));
        content.push_str(&format!("render_scale: {:?}\n", self.render_scale));
        content.push_str(&format!(
            "geometry_cache_size: {}\n",
            self.geometry_cache_size
        ));

        content
    }

    /// Clamp out-of-range values, logging each correction
    #[must_use]
    pub fn validated(mut self) -> Self {
        if self.pool_size == 0 {
            warn!("pool_size must be at least 1, using 1");
            self.pool_size = 1;
        }
        if !self.render_scale.is_finite() || self.render_scale <= 0.0 {
            warn!(
                "render_scale {} out of range, using {}",
                self.render_scale,
                default_render_scale()
            );
            self.render_scale = default_render_scale();
        } else if self.render_scale > MAX_RENDER_SCALE {
            warn!("render_scale {} capped at {MAX_RENDER_SCALE}", self.render_scale);
            self.render_scale = MAX_RENDER_SCALE;
        }
        if !self.fling_threshold.is_finite() || self.fling_threshold < 0.0 {
            warn!(
                "fling_threshold {} out of range, using {}",
                self.fling_threshold,
                default_fling_threshold()
            );
            self.fling_threshold = default_fling_threshold();
        }
        if self.geometry_cache_size == 0 {
            warn!("geometry_cache_size must be at least 1, using 1");
            self.geometry_cache_size = 1;
        }
        self
    }
}
