//! Coordinate transform between document space and display space
//!
//! Document space is fixed per page: origin at the top-left corner, units are
//! document points. Display space is the rendered surface: origin top-left,
//! units are pixels. The two are related by a per-axis scale that is
//! recomputed whenever the active page or render resolution changes.

use serde::{Deserialize, Serialize};

/// Point in document space (page points, origin top-left)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PagePoint {
    pub x: f64,
    pub y: f64,
}

impl PagePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Point in display space (pixels, origin top-left)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Box extent in document units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocSize {
    pub width: f64,
    pub height: f64,
}

impl DocSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned box in display space, `(x1, y1)` top-left and `(x2, y2)`
/// bottom-right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl DisplayBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn center_x(&self) -> f64 {
        (self.x1 + self.x2) / 2.0
    }

    /// Inclusive containment check
    pub fn contains(&self, point: ScreenPoint) -> bool {
        point.x >= self.x1 && point.x <= self.x2 && point.y >= self.y1 && point.y <= self.y2
    }

    /// Copy of this box moved by `(dx, dy)`
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x1 + dx, self.y1 + dy, self.x2 + dx, self.y2 + dy)
    }

    /// True when the box is not inverted on either axis
    pub fn is_ordered(&self) -> bool {
        self.x1 <= self.x2 && self.y1 <= self.y2
    }
}

/// Scale factors mapping document units to display pixels.
///
/// A transform can only be built from strictly positive, finite factors, so
/// a value of this type is always safe to apply in both directions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    scale_x: f64,
    scale_y: f64,
}

impl CoordinateTransform {
    /// Same zoom on both axes.
    pub fn uniform(zoom: f64) -> Option<Self> {
        Self::from_scales(zoom, zoom)
    }

    pub fn from_scales(scale_x: f64, scale_y: f64) -> Option<Self> {
        let valid = |scale: f64| scale.is_finite() && scale > 0.0;
        (valid(scale_x) && valid(scale_y)).then_some(Self { scale_x, scale_y })
    }

    /// Derive the scale from a page's intrinsic size and its rendered size.
    ///
    /// Returns `None` when either surface is zero-sized.
    pub fn from_dimensions(
        page_width: f64,
        page_height: f64,
        display_width: f64,
        display_height: f64,
    ) -> Option<Self> {
        if page_width <= 0.0 || page_height <= 0.0 {
            return None;
        }
        Self::from_scales(display_width / page_width, display_height / page_height)
    }

    pub fn scale_x(&self) -> f64 {
        self.scale_x
    }

    pub fn scale_y(&self) -> f64 {
        self.scale_y
    }

    pub fn to_display(&self, point: PagePoint) -> ScreenPoint {
        ScreenPoint::new(point.x * self.scale_x, point.y * self.scale_y)
    }

    pub fn to_document(&self, point: ScreenPoint) -> PagePoint {
        PagePoint::new(point.x / self.scale_x, point.y / self.scale_y)
    }

    /// Project a document-space box (top-left anchor plus size) to display space.
    pub fn box_to_display(&self, position: PagePoint, size: DocSize) -> DisplayBox {
        let x1 = position.x * self.scale_x;
        let y1 = position.y * self.scale_y;
        DisplayBox::new(x1, y1, x1 + size.width * self.scale_x, y1 + size.height * self.scale_y)
    }

    /// Project a display-space box back to a document anchor and size.
    pub fn box_to_document(&self, display: &DisplayBox) -> (PagePoint, DocSize) {
        let position = self.to_document(ScreenPoint::new(display.x1, display.y1));
        let size = DocSize::new(display.width() / self.scale_x, display.height() / self.scale_y);
        (position, size)
    }

    /// Display extent of a document-space size.
    pub fn size_to_display(&self, size: DocSize) -> (f64, f64) {
        (size.width * self.scale_x, size.height * self.scale_y)
    }
}
