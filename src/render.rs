use std::fmt::Write;

use anyhow::{Result, anyhow};

use crate::model::{CanvasState, DiagramConnection, DiagramNode, NodeShape};
use crate::path::{compute_connector_path, fmt_coord, polygon_points};
use crate::shapes::{Theme, shape_palette};
use crate::utils::escape_xml;
use crate::{CONNECTOR_STROKE_WIDTH, LAYOUT_BOUNDS_PADDING, LAYOUT_MIN_CANVAS_SIZE};

const NODE_BORDER_WIDTH: f64 = 2.0;
const ROUNDED_RADIUS: f64 = 12.0;
const RECTANGLE_RADIUS: f64 = 4.0;
const DEFAULT_PARALLELOGRAM_SKEW: f64 = 15.0;
const NODE_FONT_SIZE: f64 = 14.0;
const LABEL_FONT_SIZE: f64 = 12.0;

/// World-space size of the drawing: the stored canvas size when present,
/// otherwise the node bounds plus padding with the usual floor.
pub fn canvas_extent(state: &CanvasState) -> (f64, f64) {
    let (fallback_width, fallback_height) = match state.node_bounds() {
        Some((_, max)) => (
            (max.x + LAYOUT_BOUNDS_PADDING).max(LAYOUT_MIN_CANVAS_SIZE),
            (max.y + LAYOUT_BOUNDS_PADDING).max(LAYOUT_MIN_CANVAS_SIZE),
        ),
        None => (LAYOUT_MIN_CANVAS_SIZE, LAYOUT_MIN_CANVAS_SIZE),
    };
    (
        state.canvas_width.unwrap_or(fallback_width),
        state.canvas_height.unwrap_or(fallback_height),
    )
}

/// Paints the canvas as a standalone SVG document. Connections are drawn
/// beneath every node; within each layer element order is kept.
pub fn render_svg(state: &CanvasState, theme: &Theme, background: Option<&str>) -> Result<String> {
    state.validate()?;

    let (width, height) = canvas_extent(state);
    let background = background.unwrap_or(theme.background);

    let mut svg = String::new();
    write!(
        svg,
        r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="Inter, system-ui, sans-serif">
  <defs>
    <filter id="node-shadow" x="-20%" y="-20%" width="140%" height="160%">
      <feDropShadow dx="0" dy="4" stdDeviation="4" flood-color="{shadow}" />
    </filter>
  </defs>
  <rect width="100%" height="100%" fill="{background}" />
"##,
        w = fmt_coord(width),
        h = fmt_coord(height),
        shadow = theme.shadow,
        background = escape_xml(background),
    )?;

    for connection in state.connections() {
        write_connection(&mut svg, state, connection, theme)?;
    }

    for node in state.nodes() {
        write_node(&mut svg, node)?;
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

fn write_connection(
    svg: &mut String,
    state: &CanvasState,
    connection: &DiagramConnection,
    theme: &Theme,
) -> Result<()> {
    let source = state
        .node(&connection.source_id)
        .ok_or_else(|| anyhow!("missing source node for connection '{}'", connection.id))?;
    let target = state
        .node(&connection.target_id)
        .ok_or_else(|| anyhow!("missing target node for connection '{}'", connection.id))?;

    let style = &connection.style;
    let path = compute_connector_path(source, target, style);
    let stroke = style.stroke_color.as_deref().unwrap_or(theme.connector);
    let stroke_width = style.stroke_width.unwrap_or(CONNECTOR_STROKE_WIDTH);
    let dash_attr = match &style.dash_pattern {
        Some(pattern) if !pattern.is_empty() => format!(
            " stroke-dasharray=\"{}\"",
            pattern.iter().map(|v| fmt_coord(*v)).collect::<Vec<_>>().join(" ")
        ),
        _ => String::new(),
    };

    writeln!(
        svg,
        "  <path data-id=\"{}\" d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{}\" stroke-linejoin=\"round\"{} />",
        escape_xml(&connection.id),
        path.svg_data(),
        escape_xml(stroke),
        fmt_coord(stroke_width),
        dash_attr
    )?;

    if let Some(arrow) = &path.arrow {
        writeln!(
            svg,
            "  <polygon points=\"{}\" fill=\"{}\" stroke=\"{}\" stroke-width=\"1\" />",
            polygon_points(&arrow.outline),
            escape_xml(stroke),
            escape_xml(stroke)
        )?;
    }

    if let Some(label) = connection.label.as_deref().filter(|l| !l.trim().is_empty()) {
        let origin = path.label.origin();
        let fill = style
            .label_background
            .as_deref()
            .unwrap_or(theme.label_background);
        let border = style
            .label_border_color
            .as_deref()
            .unwrap_or(theme.label_border);
        let text = style
            .label_text_color
            .as_deref()
            .unwrap_or(theme.label_text);

        write!(
            svg,
            "  <g pointer-events=\"none\">\n    <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" rx=\"6\" ry=\"6\" fill=\"{}\" stroke=\"{}\" stroke-width=\"1\" />\n",
            fmt_coord(origin.x),
            fmt_coord(origin.y),
            fmt_coord(path.label.width),
            fmt_coord(path.label.height),
            escape_xml(fill),
            escape_xml(border)
        )?;
        write!(
            svg,
            "    <text x=\"{}\" y=\"{}\" fill=\"{}\" font-size=\"{}\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>\n  </g>\n",
            fmt_coord(path.label.center.x),
            fmt_coord(path.label.center.y),
            escape_xml(text),
            fmt_coord(LABEL_FONT_SIZE),
            escape_xml(label)
        )?;
    }

    Ok(())
}

fn write_node(svg: &mut String, node: &DiagramNode) -> Result<()> {
    let palette = shape_palette(node.shape);
    let style = &node.style;
    let fill = style.background_color.as_deref().unwrap_or(palette.background);
    let stroke = style.border_color.as_deref().unwrap_or(palette.border);
    let text_color = style.text_color.as_deref().unwrap_or(palette.text);
    let border_width = style.border_width.unwrap_or(NODE_BORDER_WIDTH);

    let mut extra = String::new();
    if let Some(opacity) = style.opacity {
        write!(extra, " opacity=\"{}\"", fmt_coord(opacity.clamp(0.0, 1.0)))?;
    }
    if style.shadow.unwrap_or(false) {
        extra.push_str(" filter=\"url(#node-shadow)\"");
    }
    let paint = format!(
        "fill=\"{}\" stroke=\"{}\" stroke-width=\"{}\"{}",
        escape_xml(fill),
        escape_xml(stroke),
        fmt_coord(border_width),
        extra
    );

    let (x, y, w, h) = (node.x, node.y, node.width, node.height);
    writeln!(svg, "  <g data-id=\"{}\">", escape_xml(&node.id))?;

    match node.shape {
        NodeShape::Rectangle | NodeShape::RoundedRectangle => {
            let default_radius = if node.shape == NodeShape::RoundedRectangle {
                ROUNDED_RADIUS
            } else {
                RECTANGLE_RADIUS
            };
            let radius = style.border_radius.unwrap_or(default_radius);
            writeln!(
                svg,
                "    <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" rx=\"{r}\" ry=\"{r}\" {}/>",
                fmt_coord(x),
                fmt_coord(y),
                fmt_coord(w),
                fmt_coord(h),
                paint,
                r = fmt_coord(radius)
            )?;
        }
        NodeShape::Circle => writeln!(
            svg,
            "    <ellipse cx=\"{}\" cy=\"{}\" rx=\"{}\" ry=\"{}\" {}/>",
            fmt_coord(x + w / 2.0),
            fmt_coord(y + h / 2.0),
            fmt_coord(w / 2.0),
            fmt_coord(h / 2.0),
            paint
        )?,
        NodeShape::Diamond => {
            let (cx, cy) = (x + w / 2.0, y + h / 2.0);
            writeln!(
                svg,
                "    <polygon points=\"{},{} {},{} {},{} {},{}\" {}/>",
                fmt_coord(cx),
                fmt_coord(y),
                fmt_coord(x + w),
                fmt_coord(cy),
                fmt_coord(cx),
                fmt_coord(y + h),
                fmt_coord(x),
                fmt_coord(cy),
                paint
            )?;
        }
        NodeShape::Parallelogram => {
            let skew = style.skew.unwrap_or(DEFAULT_PARALLELOGRAM_SKEW);
            let shift = (skew.to_radians().tan() * h).clamp(-w / 2.0, w / 2.0);
            writeln!(
                svg,
                "    <polygon points=\"{},{} {},{} {},{} {},{}\" {}/>",
                fmt_coord(x + shift.max(0.0)),
                fmt_coord(y),
                fmt_coord(x + w + shift.min(0.0)),
                fmt_coord(y),
                fmt_coord(x + w - shift.max(0.0)),
                fmt_coord(y + h),
                fmt_coord(x - shift.min(0.0)),
                fmt_coord(y + h),
                paint
            )?;
        }
        NodeShape::Cylinder => {
            let rx = w / 2.0;
            let ry = (h * 0.12).min(12.0);
            writeln!(
                svg,
                "    <path d=\"M {x0} {top} A {rx} {ry} 0 0 1 {x1} {top} L {x1} {bottom} A {rx} {ry} 0 0 1 {x0} {bottom} Z\" {paint}/>",
                x0 = fmt_coord(x),
                x1 = fmt_coord(x + w),
                top = fmt_coord(y + ry),
                bottom = fmt_coord(y + h - ry),
                rx = fmt_coord(rx),
                ry = fmt_coord(ry),
                paint = paint
            )?;
            writeln!(
                svg,
                "    <path d=\"M {x0} {top} A {rx} {ry} 0 0 0 {x1} {top}\" fill=\"none\" stroke=\"{stroke}\" stroke-width=\"{sw}\" />",
                x0 = fmt_coord(x),
                x1 = fmt_coord(x + w),
                top = fmt_coord(y + ry),
                rx = fmt_coord(rx),
                ry = fmt_coord(ry),
                stroke = escape_xml(stroke),
                sw = fmt_coord(border_width)
            )?;
        }
        NodeShape::Document => {
            let wave = h * 0.12;
            writeln!(
                svg,
                "    <path d=\"M {} {} H {} V {} C {} {} {} {} {} {} Z\" {}/>",
                fmt_coord(x),
                fmt_coord(y),
                fmt_coord(x + w),
                fmt_coord(y + h - wave),
                fmt_coord(x + w * 0.75),
                fmt_coord(y + h - wave * 3.0),
                fmt_coord(x + w * 0.25),
                fmt_coord(y + h + wave),
                fmt_coord(x),
                fmt_coord(y + h - wave),
                paint
            )?;
        }
    }

    let center = node.center();
    writeln!(
        svg,
        "    <text x=\"{}\" y=\"{}\" fill=\"{}\" font-size=\"{}\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>\n  </g>",
        fmt_coord(center.x),
        fmt_coord(center.y),
        escape_xml(text_color),
        fmt_coord(NODE_FONT_SIZE),
        escape_xml(&node.text)
    )?;

    Ok(())
}
