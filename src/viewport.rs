use crate::model::Point;
use crate::path::fmt_coord;
use crate::{MAX_SCALE, MIN_SCALE, ZOOM_SENSITIVITY};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanState {
    pub start: Point,
    pub offset_start: Point,
}

/// Maps between the three coordinate spaces of the canvas.
///
/// * screen: raw pointer coordinates,
/// * local: screen minus the canvas element's top-left corner,
/// * world: `local / scale - offset`, the space node coordinates live in.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub origin: Point,
    /// Pan offset in world units.
    pub offset: Point,
    pub scale: f64,
    pub width: f64,
    pub height: f64,
    pan: Option<PanState>,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280.0, 800.0)
    }
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            origin: Point::default(),
            offset: Point::default(),
            scale: 1.0,
            width,
            height,
            pan: None,
        }
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    pub fn screen_to_local(&self, screen: Point) -> Point {
        Point::new(screen.x - self.origin.x, screen.y - self.origin.y)
    }

    pub fn local_to_world(&self, local: Point) -> Point {
        Point::new(
            local.x / self.scale - self.offset.x,
            local.y / self.scale - self.offset.y,
        )
    }

    pub fn screen_to_world(&self, screen: Point) -> Point {
        self.local_to_world(self.screen_to_local(screen))
    }

    pub fn world_to_local(&self, world: Point) -> Point {
        Point::new(
            (world.x + self.offset.x) * self.scale,
            (world.y + self.offset.y) * self.scale,
        )
    }

    pub fn world_to_screen(&self, world: Point) -> Point {
        let local = self.world_to_local(world);
        Point::new(local.x + self.origin.x, local.y + self.origin.y)
    }

    pub fn visible_center_world(&self) -> Point {
        self.local_to_world(Point::new(self.width / 2.0, self.height / 2.0))
    }

    /// Zooms about the pointer so the world point under it stays put.
    /// Returns false when the scale is already pinned at a limit.
    pub fn zoom_at_pointer(&mut self, screen: Point, delta: f64) -> bool {
        let local = self.screen_to_local(screen);
        let anchor = self.local_to_world(local);
        let scale = (self.scale * (-delta * ZOOM_SENSITIVITY).exp()).clamp(MIN_SCALE, MAX_SCALE);
        if scale == self.scale {
            return false;
        }

        self.scale = scale;
        self.offset = Point::new(local.x / scale - anchor.x, local.y / scale - anchor.y);
        true
    }

    pub fn begin_pan(&mut self, screen: Point) {
        self.pan = Some(PanState {
            start: screen,
            offset_start: self.offset,
        });
    }

    pub fn update_pan(&mut self, screen: Point) -> bool {
        let Some(pan) = self.pan else {
            return false;
        };
        self.offset = Point::new(
            pan.offset_start.x + (screen.x - pan.start.x) / self.scale,
            pan.offset_start.y + (screen.y - pan.start.y) / self.scale,
        );
        true
    }

    pub fn end_pan(&mut self) -> bool {
        self.pan.take().is_some()
    }

    pub fn is_panning(&self) -> bool {
        self.pan.is_some()
    }

    pub fn svg_transform(&self) -> String {
        format!(
            "matrix({} 0 0 {} {} {})",
            fmt_coord(self.scale),
            fmt_coord(self.scale),
            fmt_coord(self.offset.x * self.scale),
            fmt_coord(self.offset.y * self.scale)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    fn assert_point_eq(actual: Point, expected: Point) {
        assert!(
            approx_eq!(f64, actual.x, expected.x, epsilon = 1e-9)
                && approx_eq!(f64, actual.y, expected.y, epsilon = 1e-9),
            "{actual:?} != {expected:?}"
        );
    }

    fn viewport() -> Viewport {
        let mut viewport = Viewport::new(800.0, 600.0);
        viewport.origin = Point::new(40.0, 60.0);
        viewport.offset = Point::new(-100.0, 25.0);
        viewport.scale = 2.0;
        viewport
    }

    #[test]
    fn screen_and_world_round_trip() {
        let viewport = viewport();
        let screen = Point::new(340.0, 260.0);
        let world = viewport.screen_to_world(screen);

        assert_point_eq(world, Point::new(250.0, 75.0));
        assert_point_eq(viewport.world_to_screen(world), screen);
    }

    #[test]
    fn zoom_keeps_world_point_under_pointer() {
        let mut viewport = viewport();
        let pointer = Point::new(500.0, 300.0);
        let before = viewport.screen_to_world(pointer);

        assert!(viewport.zoom_at_pointer(pointer, -250.0));
        assert!(viewport.scale > 2.0);
        assert_point_eq(viewport.screen_to_world(pointer), before);
    }

    #[test]
    fn zoom_in_then_out_restores_view() {
        let mut viewport = viewport();
        let original = viewport.clone();
        let pointer = Point::new(123.0, 456.0);

        viewport.zoom_at_pointer(pointer, -300.0);
        viewport.zoom_at_pointer(pointer, 300.0);

        assert!(approx_eq!(f64, viewport.scale, original.scale, epsilon = 1e-9));
        assert_point_eq(viewport.offset, original.offset);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut viewport = Viewport::new(800.0, 600.0);
        viewport.zoom_at_pointer(Point::new(10.0, 10.0), -100_000.0);
        assert!(approx_eq!(f64, viewport.scale, MAX_SCALE));
        assert!(!viewport.zoom_at_pointer(Point::new(10.0, 10.0), -10.0));

        viewport.zoom_at_pointer(Point::new(10.0, 10.0), 100_000.0);
        assert!(approx_eq!(f64, viewport.scale, MIN_SCALE));
    }

    #[test]
    fn pan_moves_offset_by_screen_delta_over_scale() {
        let mut viewport = viewport();
        viewport.begin_pan(Point::new(100.0, 100.0));
        assert!(viewport.update_pan(Point::new(140.0, 80.0)));
        assert_point_eq(viewport.offset, Point::new(-80.0, 15.0));
        assert!(viewport.end_pan());
        assert!(!viewport.update_pan(Point::new(0.0, 0.0)));
        assert_point_eq(viewport.offset, Point::new(-80.0, 15.0));
    }

    #[test]
    fn visible_center_accounts_for_pan_and_zoom() {
        let viewport = viewport();
        assert_point_eq(viewport.visible_center_world(), Point::new(300.0, 125.0));
    }
}
