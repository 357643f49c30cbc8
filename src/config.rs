// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every field has a default, so a partial file only overrides what it names.
// A missing or unparsable file falls back to defaults.

use anyhow::{Context, Result};
use glam::DVec2;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use winit::keyboard::KeyCode;

use crate::viewport::ViewportSettings;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub viewport: ViewportConfig,
    pub shaders: ShaderConfig,
    pub debug: DebugConfig,
    pub controls: ControlsConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Mandelbrot Viewer".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            max_frames_in_flight: 2,
        }
    }
}

/// Startup view and the wheel step sizes
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub center_x: f64,
    pub center_y: f64,
    pub zoom: f64,
    pub max_iterations: u32,
    pub zoom_factor: f64,
    pub iteration_step: u32,
    pub min_iterations: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        let defaults = ViewportSettings::default();
        Self {
            center_x: defaults.center.x,
            center_y: defaults.center.y,
            zoom: defaults.zoom,
            max_iterations: defaults.max_iterations,
            zoom_factor: defaults.zoom_factor,
            iteration_step: defaults.iteration_step,
            min_iterations: defaults.min_iterations,
        }
    }
}

/// Compiled SPIR-V locations
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub directory: PathBuf,
    pub vertex: String,
    pub fragment: String,
    pub hot_reload: bool,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("shaders"),
            vertex: "mandelbrot.vert.spv".to_string(),
            fragment: "mandelbrot.frag.spv".to_string(),
            hot_reload: true,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "mandelbrot_viewer.log".to_string(),
            show_fps: true,
        }
    }
}

/// Control key bindings (winit `KeyCode` names)
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub fullscreen_key: String,
    pub reset_key: String,
    pub quit_key: String,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            fullscreen_key: "F11".to_string(),
            reset_key: "KeyR".to_string(),
            quit_key: "Escape".to_string(),
        }
    }
}

/// Resolved key bindings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBindings {
    pub fullscreen: KeyCode,
    pub reset: KeyCode,
    pub quit: KeyCode,
}

impl Config {
    /// Load `config.toml`, falling back to defaults.
    ///
    /// This runs before the logger exists, so a load failure is handed back
    /// for the caller to report once logging is up.
    pub fn load() -> (Self, Option<anyhow::Error>) {
        match Self::load_from_path("config.toml") {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get present mode as Vulkan enum
    pub fn get_present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }

    /// At least one frame in flight, whatever the file says
    pub fn frames_in_flight(&self) -> usize {
        self.graphics.max_frames_in_flight.max(1)
    }

    /// Viewport settings with out-of-range values replaced by defaults
    pub fn viewport_settings(&self) -> ViewportSettings {
        let v = &self.viewport;
        let defaults = ViewportSettings::default();

        let zoom = if v.zoom.is_finite() && v.zoom > 0.0 {
            v.zoom
        } else {
            log::warn!("viewport.zoom must be positive, got {}", v.zoom);
            defaults.zoom
        };

        let zoom_factor = if v.zoom_factor.is_finite() && v.zoom_factor > 1.0 {
            v.zoom_factor
        } else {
            log::warn!("viewport.zoom_factor must be > 1, got {}", v.zoom_factor);
            defaults.zoom_factor
        };

        let min_iterations = if v.min_iterations > 0 {
            v.min_iterations
        } else {
            log::warn!("viewport.min_iterations must be at least 1");
            defaults.min_iterations
        };

        let max_iterations = if v.max_iterations >= min_iterations {
            v.max_iterations
        } else {
            log::warn!(
                "viewport.max_iterations {} is below the floor {}, raising it",
                v.max_iterations,
                min_iterations
            );
            min_iterations
        };

        let center = DVec2::new(v.center_x, v.center_y);
        let center = if center.is_finite() {
            center
        } else {
            log::warn!("viewport center must be finite, got {:?}", center);
            defaults.center
        };

        ViewportSettings {
            center,
            zoom,
            max_iterations,
            zoom_factor,
            iteration_step: v.iteration_step,
            min_iterations,
        }
    }

    pub fn key_bindings(&self) -> KeyBindings {
        let defaults = ControlsConfig::default();
        let resolve = |name: &str, fallback: &str| {
            parse_key_code(name).unwrap_or_else(|| {
                log::warn!("Unknown key '{}', using '{}'", name, fallback);
                parse_key_code(fallback).unwrap_or(KeyCode::Escape)
            })
        };

        KeyBindings {
            fullscreen: resolve(&self.controls.fullscreen_key, &defaults.fullscreen_key),
            reset: resolve(&self.controls.reset_key, &defaults.reset_key),
            quit: resolve(&self.controls.quit_key, &defaults.quit_key),
        }
    }

    pub fn vertex_shader_path(&self) -> PathBuf {
        self.shaders.directory.join(&self.shaders.vertex)
    }

    pub fn fragment_shader_path(&self) -> PathBuf {
        self.shaders.directory.join(&self.shaders.fragment)
    }
}

/// Parse a winit `KeyCode` name ("F11", "KeyR", "Escape", "Digit1", ...)
pub fn parse_key_code(name: &str) -> Option<KeyCode> {
    use KeyCode::*;

    let key = match name {
        "Escape" => Escape,
        "Space" => Space,
        "Enter" => Enter,
        "Tab" => Tab,
        "Backspace" => Backspace,
        "Home" => Home,
        "End" => End,
        "F1" => F1,
        "F2" => F2,
        "F3" => F3,
        "F4" => F4,
        "F5" => F5,
        "F6" => F6,
        "F7" => F7,
        "F8" => F8,
        "F9" => F9,
        "F10" => F10,
        "F11" => F11,
        "F12" => F12,
        "Digit0" => Digit0,
        "Digit1" => Digit1,
        "Digit2" => Digit2,
        "Digit3" => Digit3,
        "Digit4" => Digit4,
        "Digit5" => Digit5,
        "Digit6" => Digit6,
        "Digit7" => Digit7,
        "Digit8" => Digit8,
        "Digit9" => Digit9,
        _ => return parse_letter_key(name),
    };

    Some(key)
}

fn parse_letter_key(name: &str) -> Option<KeyCode> {
    use KeyCode::*;

    const LETTERS: [KeyCode; 26] = [
        KeyA, KeyB, KeyC, KeyD, KeyE, KeyF, KeyG, KeyH, KeyI, KeyJ, KeyK, KeyL, KeyM, KeyN,
        KeyO, KeyP, KeyQ, KeyR, KeyS, KeyT, KeyU, KeyV, KeyW, KeyX, KeyY, KeyZ,
    ];

    let letter = name.strip_prefix("Key")?;
    let mut chars = letter.chars();
    match (chars.next(), chars.next()) {
        (Some(c @ 'A'..='Z'), None) => Some(LETTERS[(c as u8 - b'A') as usize]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.window.title, "Mandelbrot Viewer");
        assert_eq!(config.viewport_settings(), ViewportSettings::default());
        assert_eq!(config.get_present_mode(), ash::vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let config = Config::parse(
            r#"
            [window]
            width = 800

            [viewport]
            zoom_factor = 1.25
            min_iterations = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);

        let settings = config.viewport_settings();
        assert_eq!(settings.zoom_factor, 1.25);
        assert_eq!(settings.min_iterations, 20);
        assert_eq!(settings.iteration_step, 5);
        assert_eq!(settings.max_iterations, 300);
    }

    #[test]
    fn invalid_viewport_values_fall_back() {
        let config = Config::parse(
            r#"
            [viewport]
            zoom = -2.0
            zoom_factor = 0.9
            min_iterations = 80
            max_iterations = 10
            "#,
        )
        .unwrap();

        let settings = config.viewport_settings();
        assert_eq!(settings.zoom, 1.0);
        assert_eq!(settings.zoom_factor, 1.1);
        assert_eq!(settings.min_iterations, 80);
        assert_eq!(settings.max_iterations, 80);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(Config::parse("[window\nwidth = ").is_err());
        assert!(Config::parse("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn unreadable_config_file_reports_error() {
        let path = std::env::temp_dir()
            .join(format!("mandelbrot-viewer-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[viewport\nzoom = ").unwrap();

        let result = Config::load_from_path(&path);
        let _ = std::fs::remove_file(&path);

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn missing_config_file_gives_defaults() {
        let path = std::env::temp_dir()
            .join(format!("mandelbrot-viewer-missing-{}.toml", std::process::id()));

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.window.width, Config::default().window.width);
    }

    #[test]
    fn present_mode_names() {
        let mut config = Config::default();
        config.graphics.present_mode = "Mailbox".to_string();
        assert_eq!(config.get_present_mode(), ash::vk::PresentModeKHR::MAILBOX);

        config.graphics.present_mode = "vsync-please".to_string();
        assert_eq!(config.get_present_mode(), ash::vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn frames_in_flight_never_zero() {
        let mut config = Config::default();
        config.graphics.max_frames_in_flight = 0;
        assert_eq!(config.frames_in_flight(), 1);
    }

    #[test]
    fn key_names_parse() {
        assert_eq!(parse_key_code("F11"), Some(KeyCode::F11));
        assert_eq!(parse_key_code("KeyR"), Some(KeyCode::KeyR));
        assert_eq!(parse_key_code("KeyZ"), Some(KeyCode::KeyZ));
        assert_eq!(parse_key_code("Digit7"), Some(KeyCode::Digit7));
        assert_eq!(parse_key_code("Keyr"), None);
        assert_eq!(parse_key_code("KeyRR"), None);
        assert_eq!(parse_key_code("Hyper"), None);
    }

    #[test]
    fn unknown_bindings_use_defaults() {
        let config = Config::parse(
            r#"
            [controls]
            quit_key = "KeyQ"
            reset_key = "NotAKey"
            "#,
        )
        .unwrap();

        let keys = config.key_bindings();
        assert_eq!(keys.quit, KeyCode::KeyQ);
        assert_eq!(keys.reset, KeyCode::KeyR);
        assert_eq!(keys.fullscreen, KeyCode::F11);
    }

    #[test]
    fn shader_paths_join_directory() {
        let config = Config::default();
        assert_eq!(
            config.fragment_shader_path(),
            Path::new("shaders").join("mandelbrot.frag.spv")
        );
    }
}
