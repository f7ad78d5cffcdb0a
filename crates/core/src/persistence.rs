//! Project persistence
//!
//! A project is a JSON file naming the source PDF plus the full annotation
//! list in document units. Box annotations carry `w_pdf`/`h_pdf`; point
//! annotations omit both. Files written by older tools that lack `version`,
//! `font_size` or the color fields still load.

use crate::annotation::{Annotation, AnnotationColor, AnnotationId, AnnotationStore, NamedColor, Rgb};
use crate::config::GeometryLimits;
use crate::error::{AnnotatorError, AnnotatorResult};
use crate::transform::{DocSize, PagePoint};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current project schema version
pub const PROJECT_SCHEMA_VERSION: u32 = 1;

fn default_version() -> u32 {
    PROJECT_SCHEMA_VERSION
}

fn default_font_size() -> u32 {
    12
}

fn default_color_name() -> String {
    NamedColor::Black.name().to_string()
}

/// One persisted annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub id: AnnotationId,
    pub page: u32,
    pub x_pdf: f64,
    pub y_pdf: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w_pdf: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_pdf: Option<f64>,
    pub text: String,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_color_name")]
    pub color_name: String,
    /// Missing on old files; resolved from `color_name` then
    #[serde(default)]
    pub color_rgb: Option<Rgb>,
}

impl From<&Annotation> for AnnotationRecord {
    fn from(annotation: &Annotation) -> Self {
        let position = annotation.position();
        let size = annotation.size();
        Self {
            id: annotation.id(),
            page: annotation.page(),
            x_pdf: position.x,
            y_pdf: position.y,
            w_pdf: size.map(|size| size.width),
            h_pdf: size.map(|size| size.height),
            text: annotation.text().to_string(),
            font_size: annotation.font_size(),
            color_name: annotation.color().name().to_string(),
            color_rgb: Some(annotation.color().rgb()),
        }
    }
}

impl AnnotationRecord {
    fn into_annotation(self) -> AnnotatorResult<Annotation> {
        let size = match (self.w_pdf, self.h_pdf) {
            (Some(width), Some(height)) => Some(DocSize::new(width, height)),
            (None, None) => None,
            _ => return Err(AnnotatorError::InvalidInput),
        };
        if self.font_size == 0 {
            return Err(AnnotatorError::InvalidInput);
        }
        let color = match self.color_rgb {
            Some(rgb) => AnnotationColor::with_rgb(&self.color_name, rgb),
            None => AnnotationColor::from_name(&self.color_name),
        };

        Ok(Annotation::restore(
            self.id,
            self.page,
            PagePoint::new(self.x_pdf, self.y_pdf),
            size,
            self.text,
            self.font_size,
            color,
        ))
    }
}

/// On-disk project layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(default = "default_version")]
    pub version: u32,
    pub pdf_path: PathBuf,
    #[serde(default)]
    pub annotations: Vec<AnnotationRecord>,
}

impl ProjectFile {
    pub fn from_store(pdf_path: &Path, store: &AnnotationStore) -> Self {
        Self {
            version: PROJECT_SCHEMA_VERSION,
            pdf_path: pdf_path.to_path_buf(),
            annotations: store.iter().map(AnnotationRecord::from).collect(),
        }
    }

    /// Rebuild a store from the records, validating each one.
    pub fn to_store(&self, limits: GeometryLimits) -> AnnotatorResult<AnnotationStore> {
        let annotations = self
            .annotations
            .iter()
            .cloned()
            .map(AnnotationRecord::into_annotation)
            .collect::<AnnotatorResult<Vec<_>>>()?;
        AnnotationStore::from_annotations(annotations, limits)
    }

    /// Largest page index referenced, if any
    pub fn max_page(&self) -> Option<u32> {
        self.annotations.iter().map(|record| record.page).max()
    }
}

/// A project read back from disk, with its document reference resolved
#[derive(Debug)]
pub struct LoadedProject {
    pub pdf_path: PathBuf,
    pub store: AnnotationStore,
}

/// Write a project atomically (temp file, then rename).
pub fn save_project(
    project_path: &Path,
    pdf_path: &Path,
    store: &AnnotationStore,
) -> AnnotatorResult<()> {
    let project = ProjectFile::from_store(pdf_path, store);
    let json = serde_json::to_string_pretty(&project)?;

    write_atomically(project_path, json.as_bytes())?;

    log::info!(
        "saved {} annotation(s) to {}",
        project.annotations.len(),
        project_path.display()
    );
    Ok(())
}

/// Write `contents` to a temp file beside `target`, then move it into place.
///
/// The temp file is removed if anything fails before the final rename.
fn write_atomically(target: &Path, contents: &[u8]) -> AnnotatorResult<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|err| err.error)?;
    Ok(())
}

/// Parse a project file without checking the document it refers to.
pub fn read_project(project_path: &Path) -> AnnotatorResult<ProjectFile> {
    let json = fs::read_to_string(project_path)?;
    let project: ProjectFile = serde_json::from_str(&json)?;
    if project.version > PROJECT_SCHEMA_VERSION {
        log::warn!(
            "project {} has schema version {}, newer than {}",
            project_path.display(),
            project.version,
            PROJECT_SCHEMA_VERSION
        );
    }
    Ok(project)
}

/// Locate the document a project refers to.
///
/// The stored path is tried as-is first; a relative path that does not
/// resolve from the working directory is then tried against the project's
/// own directory.
pub fn resolve_document(project_path: &Path, pdf_path: &Path) -> AnnotatorResult<PathBuf> {
    if pdf_path.is_file() {
        return Ok(pdf_path.to_path_buf());
    }
    if pdf_path.is_relative() {
        if let Some(parent) = project_path.parent() {
            let candidate = parent.join(pdf_path);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }
    Err(AnnotatorError::DocumentMissing(pdf_path.to_path_buf()))
}

/// Read a project, confirm its document exists, then rebuild the store.
///
/// Nothing is constructed until the document reference resolves.
pub fn load_project(project_path: &Path, limits: GeometryLimits) -> AnnotatorResult<LoadedProject> {
    let project = read_project(project_path)?;
    let pdf_path = resolve_document(project_path, &project.pdf_path)?;
    let store = project.to_store(limits)?;

    log::info!(
        "loaded {} annotation(s) from {}",
        store.len(),
        project_path.display()
    );
    Ok(LoadedProject { pdf_path, store })
}
