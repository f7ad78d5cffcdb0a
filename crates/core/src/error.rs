//! Error taxonomy for the annotation core
//!
//! Geometry and store errors are local and recoverable; persistence and
//! export errors are meant to be surfaced to the user. No variant is ever
//! produced after a partial mutation.

use crate::annotation::AnnotationId;
use pdf_engine::PdfEngineError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AnnotatorError {
    /// Annotation text was empty at creation
    #[error("annotation text must not be empty")]
    InvalidInput,

    /// Operation on an id the store does not hold
    #[error("annotation {0} not found")]
    NotFound(AnnotationId),

    /// A project references a document that cannot be located
    #[error("original document not found: {}", .0.display())]
    DocumentMissing(PathBuf),

    /// Export requested with an empty store
    #[error("no annotations to export")]
    NothingToExport,

    /// Placement attempted with no staged text
    #[error("enter text before placing an annotation")]
    MissingText,

    #[error("no document is open")]
    NoDocument,

    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },

    /// A project file lists the same id twice
    #[error("duplicate annotation id {0}")]
    DuplicateId(AnnotationId),

    #[error("invalid configuration value: {0}")]
    InvalidConfig(String),

    #[error("export cancelled after {pages_done} page(s)")]
    Cancelled { pages_done: u32 },

    #[error("export worker panicked")]
    WorkerPanicked,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("document engine error: {0}")]
    Engine(#[from] PdfEngineError),
}

/// Result type for annotation core operations
pub type AnnotatorResult<T> = Result<T, AnnotatorError>;
