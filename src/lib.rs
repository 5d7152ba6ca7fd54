pub mod autosave;
pub mod canvas;
pub mod config;
pub mod errors;
pub mod layout;
pub mod model;
pub mod normalize;
pub mod path;
pub mod render;
#[cfg(feature = "server")]
pub mod serve;
pub mod shapes;
pub mod utils;
pub mod viewport;

pub use autosave::*;
pub use canvas::*;
pub use config::*;
pub use errors::*;
pub use layout::*;
pub use model::*;
pub use normalize::*;
pub use path::*;
pub use render::*;
#[cfg(feature = "server")]
pub use serve::*;
pub use shapes::*;
pub use utils::*;
pub use viewport::*;

pub const CANVAS_SCHEMA_VERSION: u32 = 1;

pub const NODE_WIDTH: f64 = 150.0;
pub const NODE_HEIGHT: f64 = 80.0;
pub const DEFAULT_NODE_TEXT: &str = "New Node";
pub const APPEND_NODE_GAP: f64 = 60.0;

pub const LAYOUT_CANVAS_WIDTH: f64 = 1400.0;
pub const LAYOUT_SIDE_MARGIN: f64 = 100.0;
pub const LAYOUT_TOP_OFFSET: f64 = 100.0;
pub const LAYOUT_LEVEL_SPACING: f64 = 160.0;
pub const LAYOUT_LEAF_UNIT: f64 = 200.0;
pub const LAYOUT_BOUNDS_PADDING: f64 = 200.0;
pub const LAYOUT_MIN_CANVAS_SIZE: f64 = 2000.0;
pub const DECISION_BRANCH_MIN_SPACING: f64 = 250.0;
pub const DECISION_BRANCH_WEIGHT_SPACING: f64 = 100.0;
pub const DECISION_MULTI_BRANCH_WIDTH: f64 = 350.0;
pub const CHILD_MIN_WIDTH_FEW: f64 = 300.0;
pub const CHILD_MIN_WIDTH_MANY: f64 = 220.0;

pub const CONNECTOR_ALIGN_TOLERANCE: f64 = 10.0;
pub const CONNECTOR_CORNER_RADIUS: f64 = 15.0;
pub const CONNECTOR_ARROW_SIZE: f64 = 10.0;
pub const CONNECTOR_STROKE_WIDTH: f64 = 2.0;
pub const EDGE_LABEL_WIDTH: f64 = 100.0;
pub const EDGE_LABEL_HEIGHT: f64 = 24.0;

pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 5.0;
pub const ZOOM_SENSITIVITY: f64 = 0.001;
pub const HANDLE_HIT_RADIUS: f64 = 8.0;

pub const AUTOSAVE_DELAY_MS: u64 = 1000;
