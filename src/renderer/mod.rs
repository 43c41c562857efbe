pub mod gauge;

use crate::battery::BatteryState;
use crate::canvas::{Canvas, FontState};
use crate::config::{DisplayConfig, ThemeConfig};

use gauge::Fill;

pub const SCREEN_WIDTH: u32 = 320;
pub const SCREEN_HEIGHT: u32 = 240;

pub const UNKNOWN_MESSAGE: &str = "Error: Can't load battery status";

const CENTER_X: f32 = 160.0;
const LABEL_Y: f32 = 110.0;
const STATUS_Y: f32 = 185.0;
const HEALTH_Y: f32 = 220.0;

/// What one frame shows, derived from a battery snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Scene {
    /// No capacity reading: only the error message is shown.
    Unknown,
    Gauge {
        fill: Option<Fill>,
        label: String,
        status_line: Option<String>,
        health_line: Option<String>,
    },
}

impl Scene {
    pub fn from_state(state: &BatteryState) -> Self {
        let Some(capacity) = state.capacity else {
            return Scene::Unknown;
        };
        Scene::Gauge {
            fill: Fill::for_capacity(capacity),
            label: format!("{}%", capacity),
            status_line: state.status.as_ref().map(|s| format!("Status: {}", s)),
            health_line: state.health.as_ref().map(|h| format!("Health: {}", h)),
        }
    }
}

/// Draw `scene` over a cleared canvas. Text is skipped when no font is loaded.
pub fn render(canvas: &mut Canvas, scene: &Scene, theme: &ThemeConfig, display: &DisplayConfig, font: Option<&FontState>) {
    canvas.clear(theme.background);

    match scene {
        Scene::Unknown => {
            if let Some(font) = font {
                font.draw_text_centered(canvas, UNKNOWN_MESSAGE, CENTER_X, LABEL_Y, display.message_font_size, theme.text);
            }
        }
        Scene::Gauge { fill, label, status_line, health_line } => {
            if let Some(fill) = fill {
                gauge::draw_fill(canvas, fill, theme);
            }
            gauge::draw_outline(canvas, theme);

            let Some(font) = font else { return };
            let size = display.font_size;
            font.draw_text_centered(canvas, label, CENTER_X, LABEL_Y, size, theme.text);
            if let Some(line) = status_line {
                font.draw_text_centered(canvas, line, CENTER_X, STATUS_Y, size, theme.text);
            }
            if let Some(line) = health_line {
                font.draw_text_centered(canvas, line, CENTER_X, HEALTH_Y, size, theme.text);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauge::Tier;

    fn canvas() -> Canvas {
        Canvas::new(SCREEN_WIDTH, SCREEN_HEIGHT).unwrap()
    }

    #[test]
    fn full_charging_scene() {
        let state = BatteryState {
            capacity: Some(80.0),
            status: Some("Charging".into()),
            health: Some("Good".into()),
        };
        let Scene::Gauge { fill, label, status_line, health_line } = Scene::from_state(&state) else {
            panic!("expected gauge");
        };
        let fill = fill.unwrap();
        assert_eq!(fill.tier, Tier::Full);
        assert_eq!(fill.connector_top, None);
        assert_eq!(label, "80%");
        assert_eq!(status_line.as_deref(), Some("Status: Charging"));
        assert_eq!(health_line.as_deref(), Some("Health: Good"));
    }

    #[test]
    fn low_capacity_without_labels() {
        let state = BatteryState { capacity: Some(5.0), ..Default::default() };
        let Scene::Gauge { fill, label, status_line, health_line } = Scene::from_state(&state) else {
            panic!("expected gauge");
        };
        assert_eq!(fill.unwrap().tier, Tier::Low);
        assert_eq!(label, "5%");
        assert_eq!(status_line, None);
        assert_eq!(health_line, None);
    }

    #[test]
    fn missing_capacity_is_unknown() {
        assert_eq!(Scene::from_state(&BatteryState::default()), Scene::Unknown);
        let state = BatteryState { capacity: None, status: Some("Full".into()), health: None };
        assert_eq!(Scene::from_state(&state), Scene::Unknown);
    }

    #[test]
    fn draws_tier_color_inside_body() {
        let theme = ThemeConfig::default();
        let display = DisplayConfig::default();
        let mut canvas = canvas();
        let scene = Scene::from_state(&BatteryState { capacity: Some(50.0), ..Default::default() });
        render(&mut canvas, &scene, &theme, &display, None);

        assert_eq!(canvas.pixel(160, 140), Some(theme.mid));
        // Above the fill line the body stays empty.
        assert_eq!(canvas.pixel(160, 80), Some(theme.background));
        // Outline.
        assert_eq!(canvas.pixel(120, 100), Some(theme.outline));
    }

    #[test]
    fn unknown_scene_draws_no_gauge() {
        let theme = ThemeConfig::default();
        let mut canvas = canvas();
        render(&mut canvas, &Scene::Unknown, &theme, &DisplayConfig::default(), None);
        assert_eq!(canvas.pixel(120, 100), Some(theme.background));
        assert_eq!(canvas.pixel(160, 140), Some(theme.background));
    }
}
