//! Editor configuration.
//!
//! Every setting has a default, so a configuration file only needs to list
//! the values it overrides. A missing file means "use the defaults".

use crate::error::{AnnotatorError, AnnotatorResult};
use crate::transform::DocSize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Environment variable that overrides the render zoom.
pub const ZOOM_ENV_VAR: &str = "PDF_ANNOTATOR_ZOOM";

/// Tunable editor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Zoom factor handed to the renderer (display pixels per document unit)
    pub zoom: f64,

    /// Minimum box width in document units
    pub min_box_width: f64,

    /// Minimum box height in document units
    pub min_box_height: f64,

    /// Divisor of the box-height-to-font-size heuristic
    pub line_factor: f64,

    /// Floor of the derived font size
    pub min_font_size: u32,

    /// Width of a freshly placed box in document units
    pub default_box_width: f64,

    /// Floor of a freshly placed box's height in document units
    pub min_default_box_height: f64,

    /// Half edge of a square resize grip in display pixels
    pub handle_half_size: f64,

    /// Font size staged when the caller does not give one
    pub default_font_size: u32,

    /// Smallest font size a caller may stage
    pub min_staged_font_size: u32,

    /// Largest font size a caller may stage
    pub max_staged_font_size: u32,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            zoom: 1.5,
            min_box_width: 30.0,
            min_box_height: 15.0,
            line_factor: 1.5,
            min_font_size: 6,
            default_box_width: 200.0,
            min_default_box_height: 20.0,
            handle_half_size: 5.0,
            default_font_size: 18,
            min_staged_font_size: 6,
            max_staged_font_size: 72,
        }
    }
}

/// Geometry rules enforced by the annotation store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryLimits {
    pub min_width: f64,
    pub min_height: f64,
    pub line_factor: f64,
    pub min_font_size: u32,
}

impl Default for GeometryLimits {
    fn default() -> Self {
        EditorConfig::default().limits()
    }
}

impl GeometryLimits {
    /// Font size derived from a box height: `max(min, floor(height / line_factor))`.
    pub fn font_size_for_height(&self, height: f64) -> u32 {
        let derived = (height / self.line_factor).floor();
        if derived.is_finite() && derived > 0.0 {
            (derived as u32).max(self.min_font_size)
        } else {
            self.min_font_size
        }
    }
}

impl EditorConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or holds invalid values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AnnotatorResult<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`EditorConfig::from_file`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AnnotatorResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Applies overrides from environment variables.
    ///
    /// - `PDF_ANNOTATOR_ZOOM`: render zoom factor
    pub fn with_env_overrides(mut self) -> AnnotatorResult<Self> {
        if let Ok(value) = std::env::var(ZOOM_ENV_VAR) {
            self.zoom = value
                .parse::<f64>()
                .map_err(|_| AnnotatorError::InvalidConfig(ZOOM_ENV_VAR.to_string()))?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Saves configuration to a JSON file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> AnnotatorResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Sets the render zoom.
    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }

    /// Sets the minimum box size in document units.
    pub fn with_min_box_size(mut self, width: f64, height: f64) -> Self {
        self.min_box_width = width;
        self.min_box_height = height;
        self
    }

    pub fn limits(&self) -> GeometryLimits {
        GeometryLimits {
            min_width: self.min_box_width,
            min_height: self.min_box_height,
            line_factor: self.line_factor,
            min_font_size: self.min_font_size,
        }
    }

    /// Size of a freshly placed box for a staged font size, in document units.
    pub fn default_box_size(&self, font_size: u32) -> DocSize {
        DocSize::new(
            self.default_box_width,
            (f64::from(font_size) * self.line_factor).max(self.min_default_box_height),
        )
    }

    /// Clamp a staged font size into the accepted range.
    pub fn clamp_staged_font_size(&self, font_size: u32) -> u32 {
        font_size.clamp(self.min_staged_font_size, self.max_staged_font_size)
    }

    fn validate(&self) -> AnnotatorResult<()> {
        let positive = [
            ("zoom", self.zoom),
            ("min_box_width", self.min_box_width),
            ("min_box_height", self.min_box_height),
            ("line_factor", self.line_factor),
            ("default_box_width", self.default_box_width),
            ("min_default_box_height", self.min_default_box_height),
        ];
        if let Some((key, _)) =
            positive.iter().find(|(_, value)| !(value.is_finite() && *value > 0.0))
        {
            return Err(AnnotatorError::InvalidConfig((*key).to_string()));
        }
        if self.min_staged_font_size > self.max_staged_font_size {
            return Err(AnnotatorError::InvalidConfig("min_staged_font_size".to_string()));
        }
        Ok(())
    }
}
