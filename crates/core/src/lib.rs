//! Annotator Core Library
//!
//! Text annotations on PDF pages: the annotation store, the display/document
//! coordinate transform, pointer interaction, project files and export.

pub mod annotation;
pub mod cancel;
pub mod config;
pub mod error;
pub mod export_worker;
pub mod interaction;
pub mod manipulation;
pub mod pdf_export;
pub mod persistence;
pub mod session;
pub mod transform;

pub use annotation::{Annotation, AnnotationColor, AnnotationId, AnnotationStore, NamedColor, Rgb};
pub use cancel::CancellationToken;
pub use config::{EditorConfig, GeometryLimits};
pub use error::{AnnotatorError, AnnotatorResult};
pub use export_worker::{
    run_export, spawn_export, spawn_export_with_token, ExportEvent, ExportHandle, ExportJob,
};
pub use interaction::{
    hit_test, project_page, AnchorMode, DisplayAnnotation, DragSession, HitElement, HitTarget,
    InteractionContext, InteractionController, InteractionOutcome, InteractionState,
    PendingAnnotationConfig, PointerButton, PointerEvent,
};
pub use manipulation::{apply_drag, generate_handles, DragMode, Handle, MinimumExtent};
pub use pdf_export::{export_instructions, runs_by_page, DrawInstruction};
pub use persistence::{
    load_project, read_project, save_project, AnnotationRecord, LoadedProject, ProjectFile,
    PROJECT_SCHEMA_VERSION,
};
pub use session::EditorSession;
pub use transform::{CoordinateTransform, DisplayBox, DocSize, PagePoint, ScreenPoint};
