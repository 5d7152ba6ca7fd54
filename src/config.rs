use std::time::Duration;

use crate::layout::LayoutOptions;
use crate::shapes::Theme;
use crate::{AUTOSAVE_DELAY_MS, LAYOUT_CANVAS_WIDTH};

pub const AUTOSAVE_ENV: &str = "FLOWCANVAS_AUTOSAVE_MS";
pub const CANVAS_WIDTH_ENV: &str = "FLOWCANVAS_CANVAS_WIDTH";
pub const DARK_MODE_ENV: &str = "FLOWCANVAS_DARK_MODE";

/// Settings of the editor shell around the canvas. The layout and render
/// functions themselves only ever see explicit option structs.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    pub autosave_delay: Duration,
    pub layout: LayoutOptions,
    pub dark_mode: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl EditorConfig {
    /// Builds the config from a key lookup, falling back to built-in
    /// defaults for missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let autosave_ms = lookup(AUTOSAVE_ENV)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(AUTOSAVE_DELAY_MS);
        let canvas_width = lookup(CANVAS_WIDTH_ENV)
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|width| width.is_finite() && *width > 0.0)
            .unwrap_or(LAYOUT_CANVAS_WIDTH);
        let dark_mode = lookup(DARK_MODE_ENV)
            .map(|value| parse_flag(&value))
            .unwrap_or(false);

        Self {
            autosave_delay: Duration::from_millis(autosave_ms),
            layout: LayoutOptions {
                canvas_width,
                ..LayoutOptions::default()
            },
            dark_mode,
        }
    }

    pub fn theme(&self) -> Theme {
        Theme::for_mode(self.dark_mode)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
