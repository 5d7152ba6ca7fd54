use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::{CanvasError, CanvasResult};
use crate::{CANVAS_SCHEMA_VERSION, NODE_HEIGHT, NODE_WIDTH};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeShape {
    #[default]
    Rectangle,
    RoundedRectangle,
    Circle,
    Diamond,
    Parallelogram,
    Cylinder,
    Document,
}

impl NodeShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeShape::Rectangle => "rectangle",
            NodeShape::RoundedRectangle => "rounded-rectangle",
            NodeShape::Circle => "circle",
            NodeShape::Diamond => "diamond",
            NodeShape::Parallelogram => "parallelogram",
            NodeShape::Cylinder => "cylinder",
            NodeShape::Document => "document",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow: Option<bool>,
    /// Horizontal skew in degrees, used by parallelograms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skew: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

impl NodeStyle {
    pub fn is_empty(&self) -> bool {
        *self == NodeStyle::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramNode {
    pub id: String,
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_node_width")]
    pub width: f64,
    #[serde(default = "default_node_height")]
    pub height: f64,
    pub text: String,
    #[serde(default)]
    pub shape: NodeShape,
    #[serde(default, skip_serializing_if = "NodeStyle::is_empty")]
    pub style: NodeStyle,
}

fn default_node_width() -> f64 {
    NODE_WIDTH
}

fn default_node_height() -> f64 {
    NODE_HEIGHT
}

impl DiagramNode {
    pub fn new(id: impl Into<String>, x: f64, y: f64, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            width: NODE_WIDTH,
            height: NODE_HEIGHT,
            text: text.into(),
            shape: NodeShape::Rectangle,
            style: NodeStyle::default(),
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    pub fn handle_position(&self, handle: ConnectionHandle) -> Point {
        match handle {
            ConnectionHandle::Top => Point::new(self.x + self.width / 2.0, self.y),
            ConnectionHandle::Bottom => Point::new(self.x + self.width / 2.0, self.y + self.height),
            ConnectionHandle::Right => Point::new(self.x + self.width, self.y + self.height / 2.0),
        }
    }
}

/// Fixed anchor points a user can start drawing a connection from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHandle {
    Top,
    Bottom,
    Right,
}

impl ConnectionHandle {
    pub const ALL: [ConnectionHandle; 3] = [
        ConnectionHandle::Top,
        ConnectionHandle::Bottom,
        ConnectionHandle::Right,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrowType {
    None,
    #[default]
    Arrow,
    Triangle,
    Diamond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    Straight,
    Bezier,
    #[default]
    Orthogonal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default)]
    pub arrow_type: ArrowType,
    #[serde(default)]
    pub line_style: LineStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corner_radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash_pattern: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_arrow_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_border_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_text_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramConnection {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub style: ConnectionStyle,
}

impl DiagramConnection {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        label: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            label,
            style: ConnectionStyle::default(),
        }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source_id == node_id || self.target_id == node_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CanvasElement {
    Node(DiagramNode),
    Connection(DiagramConnection),
}

impl CanvasElement {
    pub fn id(&self) -> &str {
        match self {
            CanvasElement::Node(node) => &node.id,
            CanvasElement::Connection(connection) => &connection.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasState {
    #[serde(default)]
    pub elements: Vec<CanvasElement>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_height: Option<f64>,
}

fn default_version() -> u32 {
    CANVAS_SCHEMA_VERSION
}

impl Default for CanvasState {
    fn default() -> Self {
        Self::empty()
    }
}

impl CanvasState {
    pub fn empty() -> Self {
        Self {
            elements: Vec::new(),
            version: CANVAS_SCHEMA_VERSION,
            canvas_width: None,
            canvas_height: None,
        }
    }

    pub fn from_json(json: &str) -> CanvasResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> CanvasResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DiagramNode> {
        self.elements.iter().filter_map(|element| match element {
            CanvasElement::Node(node) => Some(node),
            CanvasElement::Connection(_) => None,
        })
    }

    pub fn connections(&self) -> impl Iterator<Item = &DiagramConnection> {
        self.elements.iter().filter_map(|element| match element {
            CanvasElement::Connection(connection) => Some(connection),
            CanvasElement::Node(_) => None,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes().next().is_none()
    }

    pub fn node(&self, id: &str) -> Option<&DiagramNode> {
        self.nodes().find(|node| node.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut DiagramNode> {
        self.elements.iter_mut().find_map(|element| match element {
            CanvasElement::Node(node) if node.id == id => Some(node),
            _ => None,
        })
    }

    pub fn connection(&self, id: &str) -> Option<&DiagramConnection> {
        self.connections().find(|connection| connection.id == id)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.elements.iter().any(|element| element.id() == id)
    }

    /// Checks id uniqueness and that every connection endpoint names a node.
    pub fn validate(&self) -> CanvasResult<()> {
        let mut seen = HashSet::new();
        for element in &self.elements {
            if !seen.insert(element.id()) {
                return Err(CanvasError::DuplicateId(element.id().to_string()));
            }
        }

        let node_ids: HashSet<&str> = self.nodes().map(|node| node.id.as_str()).collect();
        for connection in self.connections() {
            for endpoint in [&connection.source_id, &connection.target_id] {
                if !node_ids.contains(endpoint.as_str()) {
                    return Err(CanvasError::DanglingReference {
                        connection: connection.id.clone(),
                        node: endpoint.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Bounding box of all nodes as `(min, max)` world points.
    pub fn node_bounds(&self) -> Option<(Point, Point)> {
        let mut nodes = self.nodes();
        let first = nodes.next()?;
        let mut min = Point::new(first.x, first.y);
        let mut max = Point::new(first.x + first.width, first.bottom());
        for node in nodes {
            min.x = min.x.min(node.x);
            min.y = min.y.min(node.y);
            max.x = max.x.max(node.x + node.width);
            max.y = max.y.max(node.bottom());
        }
        Some((min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_state() -> CanvasState {
        let mut start = DiagramNode::new("node1", 100.0, 60.0, "Start");
        start.shape = NodeShape::RoundedRectangle;
        start.style.background_color = Some("#10b981".to_string());
        let end = DiagramNode::new("node2", 100.25, 220.5, "End");
        let mut connection = DiagramConnection::new("conn1", "node1", "node2", Some("go".into()));
        connection.style.dash_pattern = Some(vec![6.0, 4.0]);

        CanvasState {
            elements: vec![
                CanvasElement::Connection(connection),
                CanvasElement::Node(start),
                CanvasElement::Node(end),
            ],
            version: CANVAS_SCHEMA_VERSION,
            canvas_width: Some(2000.0),
            canvas_height: Some(2000.0),
        }
    }

    #[test]
    fn snapshot_round_trip_is_byte_identical() {
        let state = sample_state();
        let first = state.to_json().unwrap();
        let reloaded = CanvasState::from_json(&first).unwrap();
        let second = reloaded.to_json().unwrap();
        assert_eq!(first, second);
        assert_eq!(state, reloaded);
    }

    #[test]
    fn snapshot_uses_camel_case_fields() {
        let json = sample_state().to_json().unwrap();
        assert!(json.contains("\"sourceId\":\"node1\""));
        assert!(json.contains("\"canvasWidth\":2000.0"));
        assert!(json.contains("\"kind\":\"node\""));
        assert!(json.contains("\"shape\":\"rounded-rectangle\""));
    }

    #[test]
    fn missing_optional_fields_take_defaults() {
        let json = r#"{"elements":[{"kind":"node","id":"a","x":1,"y":2,"text":"A"}]}"#;
        let state = CanvasState::from_json(json).unwrap();
        let node = state.node("a").unwrap();
        assert_eq!(node.width, NODE_WIDTH);
        assert_eq!(node.height, NODE_HEIGHT);
        assert_eq!(node.shape, NodeShape::Rectangle);
        assert_eq!(state.version, CANVAS_SCHEMA_VERSION);
    }

    #[test]
    fn validate_reports_dangling_reference() {
        let mut state = sample_state();
        state.elements.push(CanvasElement::Connection(DiagramConnection::new(
            "conn2", "node1", "ghost", None,
        )));
        match state.validate() {
            Err(CanvasError::DanglingReference { connection, node }) => {
                assert_eq!(connection, "conn2");
                assert_eq!(node, "ghost");
            }
            other => panic!("expected dangling reference, got {other:?}"),
        }
    }

    #[test]
    fn validate_reports_duplicate_ids() {
        let mut state = sample_state();
        state
            .elements
            .push(CanvasElement::Node(DiagramNode::new("node2", 0.0, 0.0, "dup")));
        assert!(matches!(state.validate(), Err(CanvasError::DuplicateId(id)) if id == "node2"));
    }

    #[test]
    fn node_bounds_cover_all_nodes() {
        let (min, max) = sample_state().node_bounds().unwrap();
        assert_eq!(min, Point::new(100.0, 60.0));
        assert_eq!(max, Point::new(100.25 + NODE_WIDTH, 220.5 + NODE_HEIGHT));
        assert!(CanvasState::empty().node_bounds().is_none());
    }
}
