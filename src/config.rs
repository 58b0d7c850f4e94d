//! Application-level configuration loading: marker palette and quadrant colors.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "COACHING_MATRIX_CONFIG_PATH";
/// Color of the participant's own marker.
const DEFAULT_OWN_COLOR: &str = "#ffffff";
/// Fallback marker color used when the palette is empty.
const DEFAULT_COLOR: &str = "#F97316";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    palette: Vec<String>,
    own_color: String,
    quadrants: [String; 4],
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in colors.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config = Self::from_raw(raw);
                    info!(
                        path = %path.display(),
                        palette = app_config.palette.len(),
                        "loaded marker colors from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Color of the `index`-th other participant, cycling through the palette.
    pub fn marker_color(&self, index: usize) -> &str {
        if self.palette.is_empty() {
            return DEFAULT_COLOR;
        }
        &self.palette[index % self.palette.len()]
    }

    /// Color of the participant's own marker.
    pub fn own_color(&self) -> &str {
        &self.own_color
    }

    /// Quadrant background colors in reading order (top-left, top-right,
    /// bottom-left, bottom-right).
    pub fn quadrants(&self) -> &[String; 4] {
        &self.quadrants
    }

    fn from_raw(raw: RawConfig) -> Self {
        let defaults = Self::default();
        let palette: Vec<String> = raw
            .palette
            .unwrap_or_default()
            .into_iter()
            .filter(|color| {
                let valid = is_hex_color(color);
                if !valid {
                    warn!(color = %color, "ignoring invalid palette color");
                }
                valid
            })
            .collect();

        let quadrants = match raw.quadrants {
            Some(colors) if colors.iter().all(|c| is_hex_color(c)) => colors,
            Some(_) => {
                warn!("invalid quadrant colors in config; using defaults");
                defaults.quadrants.clone()
            }
            None => defaults.quadrants.clone(),
        };

        Self {
            palette: if palette.is_empty() {
                defaults.palette
            } else {
                palette
            },
            own_color: raw
                .own_color
                .filter(|color| is_hex_color(color))
                .unwrap_or(defaults.own_color),
            quadrants,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            palette: default_palette(),
            own_color: DEFAULT_OWN_COLOR.to_string(),
            quadrants: ["#FFD700", "#22C55E", "#EF4444", "#3B82F6"].map(String::from),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    palette: Option<Vec<String>>,
    own_color: Option<String>,
    quadrants: Option<[String; 4]>,
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// `#rgb` or `#rrggbb`.
fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Built-in marker palette shipped with the binary.
fn default_palette() -> Vec<String> {
    [
        "#F97316", "#A855F7", "#EC4899", "#06B6D4", "#84CC16", "#F59E0B", "#14B8A6", "#6366F1",
        "#EF4444", "#22C55E",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_cycles() {
        let config = AppConfig::default();
        assert_eq!(config.marker_color(0), "#F97316");
        assert_eq!(config.marker_color(10), "#F97316");
        assert_eq!(config.marker_color(11), "#A855F7");
    }

    #[test]
    fn hex_colors_are_validated() {
        assert!(is_hex_color("#fff"));
        assert!(is_hex_color("#3B82F6"));
        assert!(!is_hex_color("3B82F6"));
        assert!(!is_hex_color("#3B82F"));
        assert!(!is_hex_color("#GGGGGG"));
    }

    #[test]
    fn invalid_entries_fall_back_to_defaults() {
        let raw: RawConfig = serde_json::from_str(
            r##"{"palette": ["nope", "#123456"], "own_color": "white", "quadrants": ["#000", "#111", "#222", "x"]}"##,
        )
        .expect("valid json");

        let config = AppConfig::from_raw(raw);

        assert_eq!(config.marker_color(0), "#123456");
        assert_eq!(config.marker_color(1), "#123456");
        assert_eq!(config.own_color(), "#ffffff");
        assert_eq!(config.quadrants()[0], "#FFD700");
    }
}
