use std::fmt::Write as _;

use crate::model::{ArrowType, ConnectionStyle, DiagramNode, LineStyle, Point};
use crate::{
    CONNECTOR_ALIGN_TOLERANCE, CONNECTOR_ARROW_SIZE, CONNECTOR_CORNER_RADIUS, EDGE_LABEL_HEIGHT,
    EDGE_LABEL_WIDTH,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorOrientation {
    Vertical,
    Horizontal,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Top,
    Bottom,
    Left,
    Right,
}

impl Anchor {
    pub fn point(self, node: &DiagramNode) -> Point {
        let center = node.center();
        match self {
            Anchor::Top => Point::new(center.x, node.y),
            Anchor::Bottom => Point::new(center.x, node.bottom()),
            Anchor::Left => Point::new(node.x, center.y),
            Anchor::Right => Point::new(node.x + node.width, center.y),
        }
    }

    pub fn normal(self) -> Point {
        match self {
            Anchor::Top => Point::new(0.0, -1.0),
            Anchor::Bottom => Point::new(0.0, 1.0),
            Anchor::Left => Point::new(-1.0, 0.0),
            Anchor::Right => Point::new(1.0, 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    MoveTo(Point),
    LineTo(Point),
    QuadTo { control: Point, to: Point },
    CubicTo { c1: Point, c2: Point, to: Point },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrowMarker {
    pub kind: ArrowType,
    pub tip: Point,
    /// Direction of travel at the tip, in radians.
    pub angle: f64,
    pub size: f64,
    pub outline: Vec<Point>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelBox {
    pub center: Point,
    pub width: f64,
    pub height: f64,
}

impl LabelBox {
    pub fn centered_on(center: Point) -> Self {
        Self {
            center,
            width: EDGE_LABEL_WIDTH,
            height: EDGE_LABEL_HEIGHT,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(
            self.center.x - self.width / 2.0,
            self.center.y - self.height / 2.0,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorPath {
    pub orientation: ConnectorOrientation,
    pub start_anchor: Anchor,
    pub end_anchor: Anchor,
    pub points: Vec<Point>,
    pub segments: Vec<PathSegment>,
    pub arrow: Option<ArrowMarker>,
    pub label: LabelBox,
}

impl ConnectorPath {
    pub fn start(&self) -> Point {
        self.points[0]
    }

    pub fn end(&self) -> Point {
        self.points[self.points.len() - 1]
    }

    pub fn svg_data(&self) -> String {
        path_data(&self.segments)
    }
}

pub fn classify_orientation(source: &DiagramNode, target: &DiagramNode) -> ConnectorOrientation {
    if target.y >= source.bottom() {
        return ConnectorOrientation::Vertical;
    }

    let from = source.center();
    let to = target.center();
    if (to.x - from.x).abs() > (to.y - from.y).abs() {
        ConnectorOrientation::Horizontal
    } else {
        ConnectorOrientation::Other
    }
}

pub fn compute_connector_path(
    source: &DiagramNode,
    target: &DiagramNode,
    style: &ConnectionStyle,
) -> ConnectorPath {
    let orientation = classify_orientation(source, target);
    let (start_anchor, end_anchor) = match orientation {
        ConnectorOrientation::Vertical => (Anchor::Bottom, Anchor::Top),
        ConnectorOrientation::Horizontal => {
            if target.center().x >= source.center().x {
                (Anchor::Right, Anchor::Left)
            } else {
                (Anchor::Left, Anchor::Right)
            }
        }
        ConnectorOrientation::Other => (Anchor::Top, Anchor::Bottom),
    };

    let start = start_anchor.point(source);
    let end = end_anchor.point(target);

    let points = match style.line_style {
        LineStyle::Orthogonal => elbow_points(orientation, start, end),
        LineStyle::Straight | LineStyle::Bezier => vec![start, end],
    };

    let radius = style.corner_radius.unwrap_or(CONNECTOR_CORNER_RADIUS);
    let (segments, arrival_from) = match style.line_style {
        LineStyle::Orthogonal => (rounded_segments(&points, radius), points[points.len() - 2]),
        LineStyle::Straight => (
            vec![PathSegment::MoveTo(start), PathSegment::LineTo(end)],
            start,
        ),
        LineStyle::Bezier => {
            let reach = start.distance(end) / 2.0;
            let c1 = offset(start, start_anchor.normal(), reach);
            let c2 = offset(end, end_anchor.normal(), reach);
            (
                vec![
                    PathSegment::MoveTo(start),
                    PathSegment::CubicTo { c1, c2, to: end },
                ],
                c2,
            )
        }
    };

    let angle = if arrival_from == end {
        // Degenerate final segment: fall back to the entry anchor direction.
        let inward = end_anchor.normal();
        (-inward.y).atan2(-inward.x)
    } else {
        (end.y - arrival_from.y).atan2(end.x - arrival_from.x)
    };
    let size = style.end_arrow_size.unwrap_or(CONNECTOR_ARROW_SIZE);
    let arrow = arrow_marker(style.arrow_type, end, angle, size);

    let label = LabelBox::centered_on(middle_segment_midpoint(&points));

    ConnectorPath {
        orientation,
        start_anchor,
        end_anchor,
        points,
        segments,
        arrow,
        label,
    }
}

fn elbow_points(orientation: ConnectorOrientation, start: Point, end: Point) -> Vec<Point> {
    match orientation {
        ConnectorOrientation::Horizontal => {
            if (start.y - end.y).abs() <= CONNECTOR_ALIGN_TOLERANCE {
                return vec![start, end];
            }
            let mid_x = (start.x + end.x) / 2.0;
            vec![
                start,
                Point::new(mid_x, start.y),
                Point::new(mid_x, end.y),
                end,
            ]
        }
        ConnectorOrientation::Vertical | ConnectorOrientation::Other => {
            if (start.x - end.x).abs() <= CONNECTOR_ALIGN_TOLERANCE {
                return vec![start, end];
            }
            let mid_y = (start.y + end.y) / 2.0;
            vec![
                start,
                Point::new(start.x, mid_y),
                Point::new(end.x, mid_y),
                end,
            ]
        }
    }
}

/// Replaces every interior corner of the polyline by a quadratic curve of
/// the given radius. A corner stays sharp when either adjacent segment is
/// shorter than the radius.
pub fn rounded_segments(points: &[Point], radius: f64) -> Vec<PathSegment> {
    let mut segments = Vec::with_capacity(points.len() * 2);
    let Some(first) = points.first() else {
        return segments;
    };
    segments.push(PathSegment::MoveTo(*first));

    for window in points.windows(3) {
        let (prev, corner, next) = (window[0], window[1], window[2]);
        let incoming = prev.distance(corner);
        let outgoing = corner.distance(next);

        if radius <= 0.0 || incoming < radius || outgoing < radius {
            segments.push(PathSegment::LineTo(corner));
            continue;
        }

        let entry = toward(corner, prev, radius);
        let exit = toward(corner, next, radius);
        segments.push(PathSegment::LineTo(entry));
        segments.push(PathSegment::QuadTo {
            control: corner,
            to: exit,
        });
    }

    if points.len() > 1 {
        segments.push(PathSegment::LineTo(points[points.len() - 1]));
    }
    segments
}

fn toward(from: Point, to: Point, distance: f64) -> Point {
    let length = from.distance(to);
    if length == 0.0 {
        return from;
    }
    Point::new(
        from.x + (to.x - from.x) / length * distance,
        from.y + (to.y - from.y) / length * distance,
    )
}

fn offset(point: Point, direction: Point, distance: f64) -> Point {
    Point::new(point.x + direction.x * distance, point.y + direction.y * distance)
}

pub fn middle_segment_midpoint(points: &[Point]) -> Point {
    match points.len() {
        0 => Point::default(),
        1 => points[0],
        len => {
            let index = (len - 2) / 2;
            let (a, b) = (points[index], points[index + 1]);
            Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
        }
    }
}

pub fn arrow_marker(kind: ArrowType, tip: Point, angle: f64, size: f64) -> Option<ArrowMarker> {
    let glyph: &[(f64, f64)] = match kind {
        ArrowType::None => return None,
        ArrowType::Arrow => &[(0.0, 0.0), (-1.0, -0.5), (-0.6, 0.0), (-1.0, 0.5)],
        ArrowType::Triangle => &[(0.0, 0.0), (-1.0, -0.5), (-1.0, 0.5)],
        ArrowType::Diamond => &[(0.0, 0.0), (-0.5, -0.35), (-1.0, 0.0), (-0.5, 0.35)],
    };

    let (sin, cos) = angle.sin_cos();
    let outline = glyph
        .iter()
        .map(|(gx, gy)| {
            let (lx, ly) = (gx * size, gy * size);
            Point::new(tip.x + lx * cos - ly * sin, tip.y + lx * sin + ly * cos)
        })
        .collect();

    Some(ArrowMarker {
        kind,
        tip,
        angle,
        size,
        outline,
    })
}

pub fn path_data(segments: &[PathSegment]) -> String {
    let mut data = String::new();
    for segment in segments {
        if !data.is_empty() {
            data.push(' ');
        }
        let _ = match segment {
            PathSegment::MoveTo(p) => write!(data, "M {} {}", fmt_coord(p.x), fmt_coord(p.y)),
            PathSegment::LineTo(p) => write!(data, "L {} {}", fmt_coord(p.x), fmt_coord(p.y)),
            PathSegment::QuadTo { control, to } => write!(
                data,
                "Q {} {} {} {}",
                fmt_coord(control.x),
                fmt_coord(control.y),
                fmt_coord(to.x),
                fmt_coord(to.y)
            ),
            PathSegment::CubicTo { c1, c2, to } => write!(
                data,
                "C {} {} {} {} {} {}",
                fmt_coord(c1.x),
                fmt_coord(c1.y),
                fmt_coord(c2.x),
                fmt_coord(c2.y),
                fmt_coord(to.x),
                fmt_coord(to.y)
            ),
        };
    }
    data
}

pub fn polygon_points(points: &[Point]) -> String {
    points
        .iter()
        .map(|p| format!("{},{}", fmt_coord(p.x), fmt_coord(p.y)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Formats a coordinate with at most two decimals and no trailing zeros.
pub fn fmt_coord(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    let text = format!("{rounded:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    text.to_string()
}
