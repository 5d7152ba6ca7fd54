use crate::model::{NodeShape, NodeStyle};

pub const INPUT_SKEW_DEGREES: f64 = -15.0;
pub const OUTPUT_SKEW_DEGREES: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: &'static str,
    pub border: &'static str,
    pub text: &'static str,
}

pub const SUCCESS: Palette = Palette {
    background: "#10b981",
    border: "#059669",
    text: "#ffffff",
};
pub const DANGER: Palette = Palette {
    background: "#ef4444",
    border: "#dc2626",
    text: "#ffffff",
};
pub const WARNING: Palette = Palette {
    background: "#f59e0b",
    border: "#d97706",
    text: "#ffffff",
};
pub const SLATE: Palette = Palette {
    background: "#64748b",
    border: "#475569",
    text: "#ffffff",
};
pub const INFO: Palette = Palette {
    background: "#3b82f6",
    border: "#2563eb",
    text: "#ffffff",
};
pub const SECONDARY: Palette = Palette {
    background: "#0ea5e9",
    border: "#0284c7",
    text: "#ffffff",
};
pub const LIGHT_SLATE: Palette = Palette {
    background: "#94a3b8",
    border: "#64748b",
    text: "#0f172a",
};
pub const PRIMARY: Palette = Palette {
    background: "#6366f1",
    border: "#4f46e5",
    text: "#ffffff",
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeSpec {
    pub shape: NodeShape,
    pub palette: Palette,
    /// Horizontal skew in degrees; only parallelograms carry one.
    pub skew: Option<f64>,
}

impl ShapeSpec {
    const fn plain(shape: NodeShape, palette: Palette) -> Self {
        Self {
            shape,
            palette,
            skew: None,
        }
    }

    /// Node style with every palette colour filled in.
    pub fn default_style(&self) -> NodeStyle {
        NodeStyle {
            background_color: Some(self.palette.background.to_string()),
            border_color: Some(self.palette.border.to_string()),
            text_color: Some(self.palette.text.to_string()),
            skew: self.skew,
            ..NodeStyle::default()
        }
    }
}

/// Maps a semantic node type to its shape and default colours.
pub fn classify_shape(kind: &str) -> ShapeSpec {
    match kind.trim().to_ascii_lowercase().as_str() {
        "start" | "begin" => ShapeSpec::plain(NodeShape::RoundedRectangle, SUCCESS),
        "end" | "terminal" => ShapeSpec::plain(NodeShape::RoundedRectangle, DANGER),
        "decision" => ShapeSpec::plain(NodeShape::Diamond, WARNING),
        "process" => ShapeSpec::plain(NodeShape::Rectangle, SLATE),
        "input" => ShapeSpec {
            shape: NodeShape::Parallelogram,
            palette: INFO,
            skew: Some(INPUT_SKEW_DEGREES),
        },
        "output" => ShapeSpec {
            shape: NodeShape::Parallelogram,
            palette: INFO,
            skew: Some(OUTPUT_SKEW_DEGREES),
        },
        "database" | "storage" => ShapeSpec::plain(NodeShape::Cylinder, SECONDARY),
        "document" => ShapeSpec::plain(NodeShape::Document, LIGHT_SLATE),
        _ => ShapeSpec::plain(NodeShape::Rectangle, PRIMARY),
    }
}

/// Palette used when a node carries no colours of its own. Shapes shared by
/// several node types, or by untyped nodes, get the untyped palette.
pub fn shape_palette(shape: NodeShape) -> Palette {
    match shape {
        NodeShape::Diamond => WARNING,
        NodeShape::Parallelogram => INFO,
        NodeShape::Cylinder => SECONDARY,
        NodeShape::Document => LIGHT_SLATE,
        NodeShape::Rectangle | NodeShape::RoundedRectangle | NodeShape::Circle => {
            classify_shape("").palette
        }
    }
}

/// Canvas-wide colours. A pure function of the colour mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub dark_mode: bool,
    pub background: &'static str,
    pub grid: &'static str,
    pub connector: &'static str,
    pub label_background: &'static str,
    pub label_border: &'static str,
    pub label_text: &'static str,
    pub selection: &'static str,
    pub shadow: &'static str,
}

impl Theme {
    pub const LIGHT: Theme = Theme {
        dark_mode: false,
        background: "#f8fafc",
        grid: "#e2e8f0",
        connector: "#475569",
        label_background: "#ffffff",
        label_border: "#cbd5e1",
        label_text: "#1e293b",
        selection: "#6366f1",
        shadow: "rgba(15, 23, 42, 0.18)",
    };

    pub const DARK: Theme = Theme {
        dark_mode: true,
        background: "#0f172a",
        grid: "#1e293b",
        connector: "#94a3b8",
        label_background: "#1e293b",
        label_border: "#334155",
        label_text: "#e2e8f0",
        selection: "#818cf8",
        shadow: "rgba(0, 0, 0, 0.45)",
    };

    pub fn for_mode(dark_mode: bool) -> Theme {
        if dark_mode { Theme::DARK } else { Theme::LIGHT }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Theme::LIGHT
    }
}
