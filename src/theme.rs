//! Visual constants shared with the live dashboard UI. The exported report
//! must tier progress values exactly like the on-screen progress bars.

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
pub const MARGIN_TOP_MM: f32 = 18.0;
pub const MARGIN_BOTTOM_MM: f32 = 16.0;
pub const MARGIN_LEFT_MM: f32 = 14.0;
pub const MARGIN_RIGHT_MM: f32 = 14.0;

pub const PROGRESS_TRACK_MM: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color3 {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

pub const ACCENT: Color3 = Color3 { r: 0.85, g: 0.33, b: 0.10 };
pub const INK: Color3 = Color3 { r: 0.13, g: 0.13, b: 0.15 };
pub const MUTED: Color3 = Color3 { r: 0.45, g: 0.45, b: 0.48 };
pub const RULE: Color3 = Color3 { r: 0.78, g: 0.78, b: 0.80 };
pub const CARD_FILL: Color3 = Color3 { r: 0.96, g: 0.96, b: 0.97 };
pub const TRACK_FILL: Color3 = Color3 { r: 0.88, g: 0.88, b: 0.90 };
pub const WHITE: Color3 = Color3 { r: 1.0, g: 1.0, b: 1.0 };

pub const TIER_DANGER: Color3 = Color3 { r: 0.82, g: 0.21, b: 0.19 };
pub const TIER_CAUTION: Color3 = Color3 { r: 0.92, g: 0.57, b: 0.13 };
pub const TIER_WARN: Color3 = Color3 { r: 0.95, g: 0.77, b: 0.06 };
pub const TIER_SUCCESS: Color3 = Color3 { r: 0.18, g: 0.63, b: 0.31 };

pub fn content_width_mm() -> f32 {
    PAGE_WIDTH_MM - MARGIN_LEFT_MM - MARGIN_RIGHT_MM
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressTier {
    Danger,
    Caution,
    Warn,
    Success,
}

impl ProgressTier {
    pub fn color(&self) -> Color3 {
        match self {
            ProgressTier::Danger => TIER_DANGER,
            ProgressTier::Caution => TIER_CAUTION,
            ProgressTier::Warn => TIER_WARN,
            ProgressTier::Success => TIER_SUCCESS,
        }
    }
}

/// Band thresholds at 25/50/100, identical to the dashboard's progress bars.
pub fn progress_tier(value: u8) -> ProgressTier {
    if value >= 100 {
        ProgressTier::Success
    } else if value > 50 {
        ProgressTier::Warn
    } else if value > 25 {
        ProgressTier::Caution
    } else {
        ProgressTier::Danger
    }
}

/// Filled portion of a progress track, rounded like the on-screen bars.
pub fn progress_fill_mm(value: u8, track_mm: f32) -> f32 {
    (value.min(100) as f32 / 100.0 * track_mm).round()
}
