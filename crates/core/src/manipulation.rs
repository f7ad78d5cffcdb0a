//! Annotation manipulation handles and drag geometry
//!
//! Box annotations carry six resize handles: the four corners plus the
//! midpoints of the top and bottom edges. All math here runs in display space
//! on plain boxes; converting back to document units is the caller's job.

use crate::transform::{DisplayBox, ScreenPoint};

/// One of the six resize grips on a box annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    TopLeft,
    TopCenter,
    TopRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Handle {
    pub const ALL: [Handle; 6] = [
        Handle::TopLeft,
        Handle::TopCenter,
        Handle::TopRight,
        Handle::BottomLeft,
        Handle::BottomCenter,
        Handle::BottomRight,
    ];

    /// Short name (`tl`, `tc`, `tr`, `bl`, `bc`, `br`)
    pub fn name(self) -> &'static str {
        match self {
            Handle::TopLeft => "tl",
            Handle::TopCenter => "tc",
            Handle::TopRight => "tr",
            Handle::BottomLeft => "bl",
            Handle::BottomCenter => "bc",
            Handle::BottomRight => "br",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|handle| handle.name() == name)
    }

    /// Center of this handle on `bounds`
    pub fn anchor(self, bounds: &DisplayBox) -> ScreenPoint {
        let x = match self {
            Handle::TopLeft | Handle::BottomLeft => bounds.x1,
            Handle::TopCenter | Handle::BottomCenter => bounds.center_x(),
            Handle::TopRight | Handle::BottomRight => bounds.x2,
        };
        let y = if self.moves_top() { bounds.y1 } else { bounds.y2 };
        ScreenPoint::new(x, y)
    }

    /// Square hit area of this handle
    pub fn hit_box(self, bounds: &DisplayBox, half_size: f64) -> DisplayBox {
        let anchor = self.anchor(bounds);
        DisplayBox::new(
            anchor.x - half_size,
            anchor.y - half_size,
            anchor.x + half_size,
            anchor.y + half_size,
        )
    }

    fn moves_left(self) -> bool {
        matches!(self, Handle::TopLeft | Handle::BottomLeft)
    }

    fn moves_right(self) -> bool {
        matches!(self, Handle::TopRight | Handle::BottomRight)
    }

    fn moves_top(self) -> bool {
        matches!(self, Handle::TopLeft | Handle::TopCenter | Handle::TopRight)
    }
}

/// What a drag does to the annotation under it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    Move,
    Resize(Handle),
}

/// Minimum box extent in display pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimumExtent {
    pub width: f64,
    pub height: f64,
}

/// All handle hit areas for a box, in [`Handle::ALL`] order.
pub fn generate_handles(bounds: &DisplayBox, half_size: f64) -> Vec<(Handle, DisplayBox)> {
    Handle::ALL
        .into_iter()
        .map(|handle| (handle, handle.hit_box(bounds, half_size)))
        .collect()
}

/// Apply a pointer delta to the box recorded at drag start.
///
/// `Move` translates every edge. `Resize` moves only the edges adjacent to the
/// handle and pins the opposite ones; when the result falls under `minimum`,
/// the dragged edge is pushed back so the extent equals the minimum. The
/// returned box is never inverted.
pub fn apply_drag(
    mode: DragMode,
    origin: &DisplayBox,
    dx: f64,
    dy: f64,
    minimum: MinimumExtent,
) -> DisplayBox {
    let handle = match mode {
        DragMode::Move => return origin.translated(dx, dy),
        DragMode::Resize(handle) => handle,
    };

    let mut resized = *origin;
    if handle.moves_left() {
        resized.x1 += dx;
    } else if handle.moves_right() {
        resized.x2 += dx;
    }
    if handle.moves_top() {
        resized.y1 += dy;
    } else {
        resized.y2 += dy;
    }

    if resized.width() < minimum.width {
        if handle.moves_left() {
            resized.x1 = resized.x2 - minimum.width;
        } else {
            resized.x2 = resized.x1 + minimum.width;
        }
    }
    if resized.height() < minimum.height {
        if handle.moves_top() {
            resized.y1 = resized.y2 - minimum.height;
        } else {
            resized.y2 = resized.y1 + minimum.height;
        }
    }

    resized
}
