//! Annotation data model and store
//!
//! An annotation is a run of text pinned to one page. Its position (and size,
//! for box annotations) is always held in document units; display geometry is
//! derived on demand and never stored here.

use crate::config::GeometryLimits;
use crate::error::{AnnotatorError, AnnotatorResult};
use crate::transform::{DocSize, PagePoint};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an annotation
///
/// Assigned monotonically by the store, starting at 1. An id is never handed
/// out twice within a session, even after the annotation it named is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(u64);

impl AnnotationId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Normalized RGB triple, each channel in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }
}

impl From<[f64; 3]> for Rgb {
    fn from([r, g, b]: [f64; 3]) -> Self {
        Self::new(r, g, b)
    }
}

impl From<Rgb> for [f64; 3] {
    fn from(rgb: Rgb) -> Self {
        [rgb.r, rgb.g, rgb.b]
    }
}

/// The fixed annotation palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedColor {
    Black,
    Red,
    Blue,
    Green,
    Orange,
    Purple,
}

impl NamedColor {
    pub const ALL: [NamedColor; 6] = [
        NamedColor::Black,
        NamedColor::Red,
        NamedColor::Blue,
        NamedColor::Green,
        NamedColor::Orange,
        NamedColor::Purple,
    ];

    /// Case-insensitive lookup by name
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|color| color.name().eq_ignore_ascii_case(name))
    }

    pub fn name(self) -> &'static str {
        match self {
            NamedColor::Black => "black",
            NamedColor::Red => "red",
            NamedColor::Blue => "blue",
            NamedColor::Green => "green",
            NamedColor::Orange => "orange",
            NamedColor::Purple => "purple",
        }
    }

    pub fn rgb(self) -> Rgb {
        match self {
            NamedColor::Black => Rgb::new(0.0, 0.0, 0.0),
            NamedColor::Red => Rgb::new(1.0, 0.0, 0.0),
            NamedColor::Blue => Rgb::new(0.0, 0.0, 1.0),
            NamedColor::Green => Rgb::new(0.0, 1.0, 0.0),
            NamedColor::Orange => Rgb::new(1.0, 0.5, 0.0),
            NamedColor::Purple => Rgb::new(0.5, 0.0, 0.5),
        }
    }
}

/// Annotation color: the name the user picked plus its resolved triple
///
/// The name is kept verbatim so it round-trips through project files. Names
/// outside the palette resolve to black.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationColor {
    name: String,
    rgb: Rgb,
}

impl AnnotationColor {
    pub fn from_name(name: &str) -> Self {
        let rgb = NamedColor::from_name(name)
            .unwrap_or(NamedColor::Black)
            .rgb();
        Self {
            name: name.to_string(),
            rgb,
        }
    }

    /// Color with an explicit triple, as read back from a saved project.
    pub fn with_rgb(name: &str, rgb: Rgb) -> Self {
        Self {
            name: name.to_string(),
            rgb,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rgb(&self) -> Rgb {
        self.rgb
    }
}

impl Default for AnnotationColor {
    fn default() -> Self {
        Self::from_name(NamedColor::Black.name())
    }
}

/// Minimum estimated width of a point-anchored annotation, document units
const POINT_MIN_WIDTH: f64 = 40.0;
/// Minimum estimated height of a point-anchored annotation, document units
const POINT_MIN_HEIGHT: f64 = 20.0;
/// Average glyph advance as a fraction of the font size
const GLYPH_WIDTH_FACTOR: f64 = 0.5;

/// A text annotation on one page
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    id: AnnotationId,
    page: u32,
    position: PagePoint,
    size: Option<DocSize>,
    text: String,
    font_size: u32,
    color: AnnotationColor,
}

impl Annotation {
    /// Rebuild an annotation from persisted fields.
    ///
    /// Values are taken as-is; the store validates them when the annotation
    /// is handed to [`AnnotationStore::from_annotations`].
    pub fn restore(
        id: AnnotationId,
        page: u32,
        position: PagePoint,
        size: Option<DocSize>,
        text: String,
        font_size: u32,
        color: AnnotationColor,
    ) -> Self {
        Self {
            id,
            page,
            position,
            size,
            text,
            font_size,
            color,
        }
    }

    pub fn id(&self) -> AnnotationId {
        self.id
    }

    /// Zero-based page index
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Top-left anchor in document units
    pub fn position(&self) -> PagePoint {
        self.position
    }

    /// Box size in document units; `None` for point-anchored annotations
    pub fn size(&self) -> Option<DocSize> {
        self.size
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    pub fn color(&self) -> &AnnotationColor {
        &self.color
    }

    pub fn is_point_anchored(&self) -> bool {
        self.size.is_none()
    }

    /// Extent used for hit testing, in document units.
    ///
    /// Box annotations report their box. Point-anchored annotations have no
    /// stored size, so one is estimated from the text length and font size.
    pub fn extent(&self) -> DocSize {
        self.size.unwrap_or_else(|| {
            let font_size = f64::from(self.font_size);
            let chars = self.text.chars().count() as f64;
            DocSize::new(
                (chars * font_size * GLYPH_WIDTH_FACTOR).max(POINT_MIN_WIDTH),
                font_size.max(POINT_MIN_HEIGHT),
            )
        })
    }
}

/// Ordered collection of annotations, the sole owner of annotation state.
///
/// Insertion order is kept and doubles as draw order within a page.
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
    next_id: u64,
    limits: GeometryLimits,
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::with_limits(GeometryLimits::default())
    }

    pub fn with_limits(limits: GeometryLimits) -> Self {
        Self {
            annotations: Vec::new(),
            next_id: 1,
            limits,
        }
    }

    /// Build a store from previously persisted annotations.
    ///
    /// Fails on empty text, a repeated id, a non-finite position or a box
    /// whose sides are not positive. Boxes under the minimum size are grown
    /// to it and their font size re-derived. The next id is one past the
    /// largest restored id, or 1 for an empty list.
    pub fn from_annotations(
        mut annotations: Vec<Annotation>,
        limits: GeometryLimits,
    ) -> AnnotatorResult<Self> {
        let mut seen = std::collections::HashSet::with_capacity(annotations.len());
        for annotation in &mut annotations {
            if annotation.text.is_empty() {
                return Err(AnnotatorError::InvalidInput);
            }
            if !(annotation.position.x.is_finite() && annotation.position.y.is_finite()) {
                return Err(AnnotatorError::InvalidInput);
            }
            if !seen.insert(annotation.id) {
                return Err(AnnotatorError::DuplicateId(annotation.id));
            }
            if let Some(size) = annotation.size {
                if !(size.width > 0.0 && size.height > 0.0) {
                    return Err(AnnotatorError::InvalidInput);
                }
                let clamped = clamp_to_limits(size, limits)?;
                if clamped != size {
                    log::warn!("annotation {} was smaller than the minimum box", annotation.id);
                    annotation.size = Some(clamped);
                    annotation.font_size = limits.font_size_for_height(clamped.height);
                }
            }
        }

        let next_id = annotations
            .iter()
            .map(|annotation| annotation.id.raw())
            .max()
            .map_or(1, |max| max + 1);

        Ok(Self {
            annotations,
            next_id,
            limits,
        })
    }

    pub fn limits(&self) -> GeometryLimits {
        self.limits
    }

    /// Add an annotation and return its id.
    ///
    /// With a `size`, the box is clamped to the minimum size and the font size
    /// is derived from its height; `font_size` is then ignored. Without one,
    /// the annotation is point-anchored and keeps `font_size`.
    pub fn create(
        &mut self,
        page: u32,
        position: PagePoint,
        size: Option<DocSize>,
        text: &str,
        font_size: u32,
        color_name: &str,
    ) -> AnnotatorResult<AnnotationId> {
        if text.is_empty() {
            return Err(AnnotatorError::InvalidInput);
        }
        if !(position.x.is_finite() && position.y.is_finite()) {
            return Err(AnnotatorError::InvalidInput);
        }

        let (size, font_size) = match size {
            Some(size) => {
                let size = self.clamp_size(size)?;
                (Some(size), self.limits.font_size_for_height(size.height))
            }
            None if font_size == 0 => return Err(AnnotatorError::InvalidInput),
            None => (None, font_size),
        };

        let id = AnnotationId(self.next_id);
        self.next_id += 1;
        self.annotations.push(Annotation {
            id,
            page,
            position,
            size,
            text: text.to_string(),
            font_size,
            color: AnnotationColor::from_name(color_name),
        });
        log::debug!("created annotation {id} on page {page}");
        Ok(id)
    }

    pub fn get(&self, id: AnnotationId) -> AnnotatorResult<&Annotation> {
        self.annotations
            .iter()
            .find(|annotation| annotation.id == id)
            .ok_or(AnnotatorError::NotFound(id))
    }

    pub fn contains(&self, id: AnnotationId) -> bool {
        self.annotations.iter().any(|annotation| annotation.id == id)
    }

    /// Replace an annotation's position and size in one step.
    ///
    /// A present size is clamped to the minimum and the font size re-derived
    /// from it. Nothing changes when the id is unknown or the input is invalid.
    pub fn update_geometry(
        &mut self,
        id: AnnotationId,
        position: PagePoint,
        size: Option<DocSize>,
    ) -> AnnotatorResult<()> {
        if !(position.x.is_finite() && position.y.is_finite()) {
            return Err(AnnotatorError::InvalidInput);
        }
        let size = size.map(|size| self.clamp_size(size)).transpose()?;
        let limits = self.limits;

        let annotation = self
            .annotations
            .iter_mut()
            .find(|annotation| annotation.id == id)
            .ok_or(AnnotatorError::NotFound(id))?;

        annotation.position = position;
        if let Some(size) = size {
            annotation.font_size = limits.font_size_for_height(size.height);
        }
        annotation.size = size;
        Ok(())
    }

    /// Remove an annotation. Returns whether anything was removed; removing an
    /// absent id is a no-op.
    pub fn delete(&mut self, id: AnnotationId) -> bool {
        let before = self.annotations.len();
        self.annotations.retain(|annotation| annotation.id != id);
        let removed = self.annotations.len() != before;
        if removed {
            log::debug!("deleted annotation {id}");
        }
        removed
    }

    /// Annotations on `page`, in creation order
    pub fn list_for_page(&self, page: u32) -> impl Iterator<Item = &Annotation> + '_ {
        self.annotations
            .iter()
            .filter(move |annotation| annotation.page == page)
    }

    /// All annotations, in creation order
    pub fn iter(&self) -> impl Iterator<Item = &Annotation> + '_ {
        self.annotations.iter()
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Drop every annotation and restart ids at 1.
    pub fn clear(&mut self) {
        self.annotations.clear();
        self.next_id = 1;
    }

    /// Id the next `create` will assign
    pub fn next_id(&self) -> AnnotationId {
        AnnotationId(self.next_id)
    }

    fn clamp_size(&self, size: DocSize) -> AnnotatorResult<DocSize> {
        clamp_to_limits(size, self.limits)
    }
}

fn clamp_to_limits(size: DocSize, limits: GeometryLimits) -> AnnotatorResult<DocSize> {
    if !(size.width.is_finite() && size.height.is_finite()) {
        return Err(AnnotatorError::InvalidInput);
    }
    Ok(DocSize::new(
        size.width.max(limits.min_width),
        size.height.max(limits.min_height),
    ))
}
