use serde::{Deserialize, Serialize};

use crate::navigation::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualState {
    /// Colour derived from the display name.
    Neutral,
    /// The focused entity, drawn on top.
    Selected,
    /// A sibling of the focused entity.
    Dimmed,
    /// Under the pointer while the level is not locked against it.
    Hovered,
    /// Village fill driven by a count bucket (0..=5).
    ValueScaled(u8),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureStyle {
    pub fill_color: String,
    pub fill_opacity: f64,
    pub color: String,
    pub weight: f64,
    pub opacity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dash_array: Option<String>,
}

/// Colours and opacities used by the synchronizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StylePalette {
    pub border: String,
    pub highlight: String,
    pub dimmed_fill: String,
    pub dimmed_border: String,
    /// Village fill colours from the lowest bucket to the highest.
    pub value_ramp: [String; 6],
    /// Lower bounds (exclusive) of buckets 1..=5.
    pub value_thresholds: [u64; 5],
    pub neutral_saturation: u8,
    pub neutral_lightness: u8,
    pub marker_min_px: f64,
    pub marker_max_px: f64,
    pub marker_log_scale: f64,
}

impl Default for StylePalette {
    fn default() -> Self {
        Self {
            border: "white".to_string(),
            highlight: "#f59e0b".to_string(),
            dimmed_fill: "#cbd5e1".to_string(),
            dimmed_border: "#e2e8f0".to_string(),
            value_ramp: [
                "#dbeafe".to_string(),
                "#93c5fd".to_string(),
                "#60a5fa".to_string(),
                "#3b82f6".to_string(),
                "#1d4ed8".to_string(),
                "#1e3a8a".to_string(),
            ],
            value_thresholds: [100, 200, 400, 600, 800],
            neutral_saturation: 60,
            neutral_lightness: 85,
            marker_min_px: 30.0,
            marker_max_px: 80.0,
            marker_log_scale: 6.0,
        }
    }
}

/// Stable hue for a region name, hashed over its UTF-16 code units.
///
/// The accumulator is a float. Only the shifted term is truncated to 32 bits,
/// so the running value can leave the `i32` range on longer names and the
/// hue differs from a plain wrapping `h * 31 + c`.
pub fn name_hue(name: &str) -> u16 {
    let hash = name.encode_utf16().fold(0f64, |h, c| {
        let shifted = ((h as i64) as i32) << 5;
        f64::from(c) + (f64::from(shifted) - h)
    });
    (hash % 360.0).abs() as u16
}

impl StylePalette {
    pub fn region_color(&self, name: &str) -> String {
        format!(
            "hsl({}, {}%, {}%)",
            name_hue(name),
            self.neutral_saturation,
            self.neutral_lightness
        )
    }

    /// Magnitude bucket for a count, 0 (lowest) to 5.
    pub fn value_bucket(&self, count: u64) -> u8 {
        self.value_thresholds
            .iter()
            .filter(|&&t| count > t)
            .count() as u8
    }

    /// Bubble diameter for a count: `ln(count) * scale`, clamped.
    pub fn marker_size(&self, count: u64) -> f64 {
        let raw = (count.max(1) as f64).ln() * self.marker_log_scale;
        raw.clamp(self.marker_min_px, self.marker_max_px)
    }

    /// Style for a feature. `name` drives the neutral colour; in clustering
    /// sub-mode it is the district name so a district's villages share one.
    pub fn style_for(
        &self,
        level: Level,
        clustered: bool,
        name: &str,
        state: VisualState,
    ) -> FeatureStyle {
        let base = self.base_style(level, clustered, name);
        match state {
            VisualState::Neutral => base,
            VisualState::ValueScaled(bucket) => FeatureStyle {
                fill_color: self.value_ramp[usize::from(bucket.min(5))].clone(),
                fill_opacity: 0.8,
                ..base
            },
            VisualState::Selected => FeatureStyle {
                fill_color: self.highlight.clone(),
                fill_opacity: 0.9,
                weight: 3.0,
                color: self.border.clone(),
                ..base
            },
            VisualState::Dimmed => FeatureStyle {
                fill_color: self.dimmed_fill.clone(),
                fill_opacity: 0.1,
                weight: 1.0,
                color: self.dimmed_border.clone(),
                ..base
            },
            VisualState::Hovered => FeatureStyle {
                weight: 3.0,
                color: self.highlight.clone(),
                dash_array: None,
                fill_opacity: 0.9,
                ..base
            },
        }
    }

    fn base_style(&self, level: Level, clustered: bool, name: &str) -> FeatureStyle {
        let fill = self.region_color(name);
        if clustered {
            // borders in the fill colour so villages read as one district
            return FeatureStyle {
                color: fill.clone(),
                fill_color: fill,
                fill_opacity: 0.6,
                weight: 1.0,
                opacity: 1.0,
                dash_array: None,
            };
        }
        let dashed = !matches!(level, Level::Province | Level::Village);
        FeatureStyle {
            fill_color: fill,
            fill_opacity: 0.6,
            color: self.border.clone(),
            weight: 1.0,
            opacity: 1.0,
            dash_array: dashed.then(|| "3".to_string()),
        }
    }
}

/// `1.5M`, `12.3K`, or the plain number below a thousand.
pub fn format_compact(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}
