use std::path::PathBuf;

use crate::canvas::{CanvasState, DisplaySettings, GridError, MAX_GRID_DIM, MIN_GRID_DIM, clamp_cell_size};
use crate::components::colors::Color;
use crate::ops::trace::TraceSettings;

/// Editor preferences that persist across sessions
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    /// Grid size offered for new projects
    pub default_width: u32,
    pub default_height: u32,
    /// Rendered pixels per cell
    pub cell_size: u32,
    /// Cells traced between yields
    pub trace_batch_size: usize,
    /// Channels at or above this count as paper when tracing
    pub trace_white_threshold: u8,
    /// Corner sample inset in canvas pixels
    pub trace_sample_inset: f64,
    pub show_grid: bool,
    /// Backdrop colour for new projects
    pub background_color: Color,
    pub grid_color: Color,
}

impl Default for EditorSettings {
    fn default() -> Self {
        let trace = TraceSettings::default();
        Self {
            default_width: 32,
            default_height: 32,
            cell_size: 10,
            trace_batch_size: trace.batch_size,
            trace_white_threshold: trace.white_threshold,
            trace_sample_inset: trace.sample_inset,
            show_grid: true,
            background_color: Color::WHITE,
            grid_color: Color::from_rgb(0, 255, 255),
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/pixelfe/pixelfe_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\PixelFE\pixelfe_settings.cfg
    /// On macOS:   ~/Library/Application Support/PixelFE/pixelfe_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            PathBuf::from(std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?).join("PixelFE")
        } else if cfg!(target_os = "macos") {
            PathBuf::from(std::env::var("HOME").ok()?)
                .join("Library")
                .join("Application Support")
                .join("PixelFE")
        } else {
            std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
                .ok()?
                .join("pixelfe")
        };
        let _ = std::fs::create_dir_all(&config_dir);
        Some(config_dir.join("pixelfe_settings.cfg"))
    }

    /// Save settings to disk. Failures are logged, never fatal.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = std::fs::write(&path, self.to_config_string()) {
            log::warn!("could not save settings to {}: {}", path.display(), e);
        }
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::parse_str(&content)
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "default_width={}\n\
             default_height={}\n\
             cell_size={}\n\
             trace_batch_size={}\n\
             trace_white_threshold={}\n\
             trace_sample_inset={}\n\
             show_grid={}\n\
             background_color={}\n\
             grid_color={}\n",
            self.default_width,
            self.default_height,
            self.cell_size,
            self.trace_batch_size,
            self.trace_white_threshold,
            self.trace_sample_inset,
            self.show_grid,
            self.background_color,
            self.grid_color,
        )
    }

    /// Parse `key=value` lines. Unknown keys and bad values keep the default.
    pub fn parse_str(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "default_width" => {
                    s.default_width = val.parse().unwrap_or(s.default_width).clamp(MIN_GRID_DIM, MAX_GRID_DIM);
                }
                "default_height" => {
                    s.default_height = val.parse().unwrap_or(s.default_height).clamp(MIN_GRID_DIM, MAX_GRID_DIM);
                }
                "cell_size" => {
                    s.cell_size = clamp_cell_size(val.parse().unwrap_or(s.cell_size));
                }
                "trace_batch_size" => {
                    s.trace_batch_size = val.parse().unwrap_or(s.trace_batch_size).max(1);
                }
                "trace_white_threshold" => {
                    s.trace_white_threshold = val.parse().unwrap_or(s.trace_white_threshold);
                }
                "trace_sample_inset" => {
                    if let Ok(v) = val.parse::<f64>()
                        && v.is_finite()
                        && v >= 0.0
                    {
                        s.trace_sample_inset = v;
                    }
                }
                "show_grid" => {
                    s.show_grid = val == "true";
                }
                "background_color" => {
                    if let Ok(c) = Color::parse(val) { s.background_color = c; }
                }
                "grid_color" => {
                    if let Ok(c) = Color::parse(val) { s.grid_color = c; }
                }
                _ => {}
            }
        }
        s
    }

    pub fn trace_settings(&self) -> TraceSettings {
        TraceSettings {
            batch_size: self.trace_batch_size,
            white_threshold: self.trace_white_threshold,
            sample_inset: self.trace_sample_inset,
        }
    }

    /// Display settings for a fresh document.
    pub fn display_settings(&self) -> DisplaySettings {
        DisplaySettings {
            show_grid: self.show_grid,
            cell_size: clamp_cell_size(self.cell_size),
            grid_color: self.grid_color,
            ..DisplaySettings::default()
        }
    }

    /// Blank canvas at the default size with these preferences applied.
    pub fn new_canvas(&self) -> Result<CanvasState, GridError> {
        let mut state = CanvasState::new(self.default_width, self.default_height)?;
        state.display = self.display_settings();
        state.background_color = self.background_color;
        Ok(state)
    }
}

impl From<&EditorSettings> for TraceSettings {
    fn from(settings: &EditorSettings) -> Self {
        settings.trace_settings()
    }
}
