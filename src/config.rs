use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub theme: ThemeConfig,
    #[serde(default)]
    pub keys: KeyConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,
    #[serde(default = "default_framebuffer")]
    pub framebuffer: PathBuf,
    #[serde(default = "default_pixel_format")]
    pub pixel_format: PixelFormat,
    /// Bytes per framebuffer row; width * bytes-per-pixel when unset.
    #[serde(default)]
    pub line_length: Option<usize>,
    #[serde(default = "default_inputs")]
    pub inputs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb565,
    Xrgb8888,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_font")]
    pub font: String,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_message_font_size")]
    pub message_font_size: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    #[serde(default = "default_background", deserialize_with = "deserialize_color")]
    pub background: [u8; 4],
    #[serde(default = "default_white", deserialize_with = "deserialize_color")]
    pub outline: [u8; 4],
    #[serde(default = "default_white", deserialize_with = "deserialize_color")]
    pub text: [u8; 4],
    #[serde(default = "default_full_color", deserialize_with = "deserialize_color")]
    pub full: [u8; 4],
    #[serde(default = "default_mid_color", deserialize_with = "deserialize_color")]
    pub mid: [u8; 4],
    #[serde(default = "default_low_color", deserialize_with = "deserialize_color")]
    pub low: [u8; 4],
}

/// Linux input key codes that end the program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    #[serde(default = "default_confirm_key")]
    pub confirm: u16,
    #[serde(default = "default_cancel_key")]
    pub cancel: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

// Defaults

fn default_status_file() -> PathBuf { "/sys/class/power_supply/battery/uevent".into() }
fn default_framebuffer() -> PathBuf { "/dev/fb0".into() }
fn default_pixel_format() -> PixelFormat { PixelFormat::Rgb565 }
fn default_inputs() -> Vec<PathBuf> { vec!["/dev/input/event0".into()] }
fn default_fps() -> u32 { 30 }
fn default_font() -> String { "monospace".into() }
fn default_font_size() -> f32 { 36.0 }
fn default_message_font_size() -> f32 { 18.0 }
fn default_confirm_key() -> u16 { 28 } // KEY_ENTER, START on the GCW Zero
fn default_cancel_key() -> u16 { 1 } // KEY_ESC, SELECT on the GCW Zero
fn default_shutdown_timeout_ms() -> u64 { 1000 }

fn default_background() -> [u8; 4] { [0x00, 0x00, 0x00, 0xFF] }
fn default_white() -> [u8; 4] { [0xFF, 0xFF, 0xFF, 0xFF] }
fn default_full_color() -> [u8; 4] { [0x00, 0xFF, 0x00, 0xFF] }
fn default_mid_color() -> [u8; 4] { [0xE6, 0xFF, 0x00, 0xFF] }
fn default_low_color() -> [u8; 4] { [0xFF, 0x00, 0x00, 0xFF] }

fn deserialize_color<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 4], D::Error> {
    let s = String::deserialize(d)?;
    parse_color(&s).map_err(serde::de::Error::custom)
}

pub fn parse_color(s: &str) -> Result<[u8; 4]> {
    let s = s.trim_start_matches('#');
    anyhow::ensure!(
        s.is_ascii() && (s.len() == 6 || s.len() == 8),
        "Color must be RRGGBB or RRGGBBAA"
    );
    let r = u8::from_str_radix(&s[0..2], 16)?;
    let g = u8::from_str_radix(&s[2..4], 16)?;
    let b = u8::from_str_radix(&s[4..6], 16)?;
    let a = if s.len() == 8 { u8::from_str_radix(&s[6..8], 16)? } else { 0xFF };
    Ok([r, g, b, a])
}

// Implementations

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            status_file: default_status_file(),
            framebuffer: default_framebuffer(),
            pixel_format: default_pixel_format(),
            line_length: None,
            inputs: default_inputs(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            font: default_font(),
            font_size: default_font_size(),
            message_font_size: default_message_font_size(),
        }
    }
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            background: default_background(),
            outline: default_white(),
            text: default_white(),
            full: default_full_color(),
            mid: default_mid_color(),
            low: default_low_color(),
        }
    }
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            confirm: default_confirm_key(),
            cancel: default_cancel_key(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { shutdown_timeout_ms: default_shutdown_timeout_ms() }
    }
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb565 => 2,
            PixelFormat::Xrgb8888 => 4,
        }
    }
}

impl DisplayConfig {
    /// Time between frames. A zero fps is treated as one frame per second.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

impl WatchConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

pub fn default_config_path() -> PathBuf {
    dirs_path().join("config.toml")
}

fn dirs_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
            PathBuf::from(home).join(".config")
        });
    base.join("gcw-battery")
}

pub fn load_config(path: &std::path::Path) -> Result<MonitorConfig> {
    if !path.exists() {
        log::info!("Config file not found at {}, generating default", path.display());
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::fs::write(path, DEFAULT_CONFIG) {
            Ok(()) => log::info!("Created default config at {}", path.display()),
            Err(e) => log::warn!("Failed to write default config: {}", e),
        }
        return Ok(MonitorConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: MonitorConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    Ok(config)
}

const DEFAULT_CONFIG: &str = r#"# gcw-battery configuration
# Generated automatically on first run. Defaults are shown.

[device]
# Power-supply uevent file to watch
status_file = "/sys/class/power_supply/battery/uevent"
# Framebuffer device and its pixel layout: "rgb565" | "xrgb8888"
framebuffer = "/dev/fb0"
pixel_format = "rgb565"
# Bytes per framebuffer row (defaults to width * bytes per pixel)
# line_length = 640
# evdev nodes polled for key presses
inputs = ["/dev/input/event0"]

[display]
# Frame rate ceiling
fps = 30
# Font: system font name or path to .ttf/.otf
font = "monospace"
font_size = 36.0
# Size of the "can't load battery status" message
message_font_size = 18.0

[theme]
# Colours in RRGGBB or RRGGBBAA hex (# prefix optional)
background = "000000"
outline    = "FFFFFF"
text       = "FFFFFF"
# Gauge fill: above 65%, above 25%, 25% or less
full = "00FF00"
mid  = "E6FF00"
low  = "FF0000"

[keys]
# Linux key codes that quit (28 = Enter/START, 1 = Esc/SELECT)
confirm = 28
cancel  = 1

[watch]
# How long to wait for the watcher thread on exit
shutdown_timeout_ms = 1000
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_config_matches_defaults() {
        let parsed: MonitorConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        let defaults = MonitorConfig::default();
        assert_eq!(parsed.device.status_file, defaults.device.status_file);
        assert_eq!(parsed.device.pixel_format, PixelFormat::Rgb565);
        assert_eq!(parsed.display.fps, 30);
        assert_eq!(parsed.theme.mid, defaults.theme.mid);
        assert_eq!(parsed.keys.confirm, 28);
        assert_eq!(parsed.keys.cancel, 1);
        assert_eq!(parsed.watch.shutdown_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let parsed: MonitorConfig = toml::from_str("[display]\nfps = 10\n").unwrap();
        assert_eq!(parsed.display.fps, 10);
        assert_eq!(parsed.display.frame_period(), Duration::from_millis(100));
        assert_eq!(parsed.device.framebuffer, PathBuf::from("/dev/fb0"));
    }

    #[test]
    fn parses_colors() {
        assert_eq!(parse_color("#E6FF00").unwrap(), [0xE6, 0xFF, 0x00, 0xFF]);
        assert_eq!(parse_color("11223344").unwrap(), [0x11, 0x22, 0x33, 0x44]);
        assert!(parse_color("fff").is_err());
        assert!(parse_color("zzzzzz").is_err());
    }

    #[test]
    fn writes_default_file_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gcw-battery").join("config.toml");
        let config = load_config(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.display.font_size, 36.0);
    }
}
