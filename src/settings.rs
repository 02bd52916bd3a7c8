// ============================================================================
// EDITOR SETTINGS — persisted as a plain key=value file
// ============================================================================

use std::path::{Path, PathBuf};

use image::Rgba;

use crate::error::EditError;
use crate::logger::Level;
use crate::params::{color_to_hex, parse_color};

#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    /// Maximum number of undo steps kept in history
    pub max_undo_steps: usize,
    /// History memory budget in MiB (0 = unlimited)
    pub max_history_mb: usize,
    pub default_width: u32,
    pub default_height: u32,
    /// Fill colour of the "Background" layer in new documents
    pub background: Rgba<u8>,
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub log_level: Level,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            max_undo_steps: 50,
            max_history_mb: 100,
            default_width: 800,
            default_height: 600,
            background: Rgba([255, 255, 255, 255]),
            min_zoom: 0.1,
            max_zoom: 100.0,
            log_level: Level::Info,
        }
    }
}

impl EditorSettings {
    /// Platform config location, next to the session log.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA")
                .ok()
                .map(|appdata| PathBuf::from(appdata).join("PaintFE").join("paintfe_core.cfg"))
        }
        #[cfg(not(target_os = "windows"))]
        {
            if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
                return Some(PathBuf::from(xdg).join("PaintFE").join("paintfe_core.cfg"));
            }
            std::env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".config").join("PaintFE").join("paintfe_core.cfg"))
        }
    }

    /// Load from the platform location (default if missing or corrupt)
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from `path`.  A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Parse settings text.  Unknown keys are ignored and unparsable values
    /// keep their default.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "max_undo_steps" => {
                    s.max_undo_steps = val.parse().ok().filter(|&n| n > 0).unwrap_or(50);
                }
                "max_history_mb" => {
                    s.max_history_mb = val.parse().unwrap_or(100);
                }
                "default_width" => {
                    s.default_width = val.parse().ok().filter(|&n| n > 0).unwrap_or(800);
                }
                "default_height" => {
                    s.default_height = val.parse().ok().filter(|&n| n > 0).unwrap_or(600);
                }
                "background" => {
                    if let Some(c) = parse_color(val) {
                        s.background = c;
                    }
                }
                "min_zoom" => {
                    s.min_zoom = val.parse().ok().filter(|z: &f32| z.is_finite() && *z > 0.0).unwrap_or(0.1);
                }
                "max_zoom" => {
                    s.max_zoom = val.parse().ok().filter(|z: &f32| z.is_finite() && *z > 0.0).unwrap_or(100.0);
                }
                "log_level" => {
                    s.log_level = Level::parse(val).unwrap_or(Level::Info);
                }
                _ => {}
            }
        }
        (s.min_zoom, s.max_zoom) = s.zoom_range();
        s
    }

    /// Zoom bounds with non-finite or non-positive values replaced by the
    /// defaults and the pair ordered `min <= max`.
    pub fn zoom_range(&self) -> (f32, f32) {
        let usable = |z: f32| z.is_finite() && z > 0.0;
        let min = if usable(self.min_zoom) { self.min_zoom } else { 0.1 };
        let max = if usable(self.max_zoom) { self.max_zoom } else { 100.0 };
        if max < min { (max, min) } else { (min, max) }
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "max_undo_steps={}\n\
             max_history_mb={}\n\
             default_width={}\n\
             default_height={}\n\
             background={}\n\
             min_zoom={}\n\
             max_zoom={}\n\
             log_level={}\n",
            self.max_undo_steps,
            self.max_history_mb,
            self.default_width,
            self.default_height,
            color_to_hex(self.background),
            self.min_zoom,
            self.max_zoom,
            self.log_level.tag().to_ascii_lowercase(),
        )
    }

    pub fn save_to(&self, path: &Path) -> Result<(), EditError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }
}
