use crate::canvas::Canvas;
use crate::config::ThemeConfig;

// Layout on the 320x240 logical screen.
const BODY_LEFT: f32 = 120.0;
const BODY_RIGHT: f32 = 200.0;
const BODY_TOP: f32 = 60.0;
const BODY_BOTTOM: f32 = 160.0;
const BODY_HEIGHT: f32 = 120.0;
const TIP_LEFT: f32 = 140.0;
const TIP_RIGHT: f32 = 180.0;
const TIP_TOP: f32 = 40.0;
const BORDER_WIDTH: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Full,
    Mid,
    Low,
}

impl Tier {
    /// Boundaries belong to the lower tier: 65 is mid, 25 is low.
    pub fn for_capacity(capacity: f32) -> Self {
        if capacity > 65.0 {
            Tier::Full
        } else if capacity > 25.0 {
            Tier::Mid
        } else {
            Tier::Low
        }
    }

    pub fn color(self, theme: &ThemeConfig) -> [u8; 4] {
        match self {
            Tier::Full => theme.full,
            Tier::Mid => theme.mid,
            Tier::Low => theme.low,
        }
    }
}

/// Filled part of the gauge for a non-zero capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub tier: Tier,
    /// Top edge of the body fill, never above the body's top.
    pub body_top: f32,
    /// Top edge of the fill inside the tip, only when the level reaches the tip.
    pub connector_top: Option<f32>,
}

impl Fill {
    pub fn for_capacity(capacity: f32) -> Option<Self> {
        if capacity <= 0.0 {
            return None;
        }
        let level = BODY_BOTTOM - (BODY_HEIGHT * capacity / 100.0);
        let connector_top = (TIP_TOP..=BODY_TOP).contains(&level).then_some(level);
        Some(Self {
            tier: Tier::for_capacity(capacity),
            body_top: level.max(BODY_TOP),
            connector_top,
        })
    }
}

pub fn draw_fill(canvas: &mut Canvas, fill: &Fill, theme: &ThemeConfig) {
    let color = fill.tier.color(theme);
    canvas.fill_polygon(
        &[
            (BODY_LEFT, fill.body_top),
            (BODY_LEFT, BODY_BOTTOM),
            (BODY_RIGHT, BODY_BOTTOM),
            (BODY_RIGHT, fill.body_top),
        ],
        color,
    );
    if let Some(top) = fill.connector_top {
        canvas.fill_polygon(
            &[(TIP_LEFT, top), (TIP_LEFT, BODY_TOP), (TIP_RIGHT, BODY_TOP), (TIP_RIGHT, top)],
            color,
        );
    }
}

pub fn draw_outline(canvas: &mut Canvas, theme: &ThemeConfig) {
    let c = theme.outline;
    let w = BORDER_WIDTH;
    // Body
    canvas.draw_line(BODY_LEFT, BODY_TOP, BODY_LEFT, BODY_BOTTOM, c, w);
    canvas.draw_line(BODY_RIGHT, BODY_TOP, BODY_RIGHT, BODY_BOTTOM, c, w);
    canvas.draw_line(BODY_LEFT, BODY_BOTTOM, BODY_RIGHT, BODY_BOTTOM, c, w);
    canvas.draw_line(BODY_LEFT, BODY_TOP, TIP_LEFT, BODY_TOP, c, w);
    canvas.draw_line(TIP_RIGHT, BODY_TOP, BODY_RIGHT, BODY_TOP, c, w);
    // Tip
    canvas.draw_line(TIP_LEFT, BODY_TOP, TIP_LEFT, TIP_TOP, c, w);
    canvas.draw_line(TIP_RIGHT, BODY_TOP, TIP_RIGHT, TIP_TOP, c, w);
    canvas.draw_line(TIP_LEFT, TIP_TOP, TIP_RIGHT, TIP_TOP, c, w);
}
