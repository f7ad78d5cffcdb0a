//! Editing session
//!
//! Ties a document engine to the annotation store, the interaction state
//! machine and persistence. All mutation happens on the thread that owns the
//! session; only export is handed to a background worker.

use crate::annotation::AnnotationStore;
use crate::config::EditorConfig;
use crate::error::{AnnotatorError, AnnotatorResult};
use crate::export_worker::{spawn_export, ExportHandle, ExportJob};
use crate::interaction::{
    project_page, DisplayAnnotation, InteractionContext, InteractionController, InteractionOutcome,
    PendingAnnotationConfig, PointerEvent,
};
use crate::pdf_export::{export_instructions, DrawInstruction};
use crate::persistence::{self, read_project, resolve_document};
use crate::transform::CoordinateTransform;
use pdf_engine::{
    DocumentHandle, OpenSource, PdfEngine, PdfEngineError, PdfWriter, RenderRequest, RgbaImage,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct OpenDocument {
    path: PathBuf,
    handle: DocumentHandle,
    page_count: u32,
}

/// A page raster and the transform derived from it
struct PageView {
    transform: CoordinateTransform,
    raster: RgbaImage,
}

pub struct EditorSession<E: PdfEngine> {
    engine: E,
    config: EditorConfig,
    document: Option<OpenDocument>,
    current_page: u32,
    transform: Option<CoordinateTransform>,
    store: AnnotationStore,
    interaction: InteractionController,
}

impl<E: PdfEngine> EditorSession<E> {
    pub fn new(engine: E, config: EditorConfig) -> Self {
        let store = AnnotationStore::with_limits(config.limits());
        Self {
            engine,
            config,
            document: None,
            current_page: 0,
            transform: None,
            store,
            interaction: InteractionController::new(),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn interaction(&self) -> &InteractionController {
        &self.interaction
    }

    pub fn document_path(&self) -> Option<&Path> {
        self.document.as_ref().map(|doc| doc.path.as_path())
    }

    pub fn page_count(&self) -> Option<u32> {
        self.document.as_ref().map(|doc| doc.page_count)
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Transform of the last successful render
    pub fn transform(&self) -> Option<CoordinateTransform> {
        self.transform
    }

    /// Open `path`, replacing the current document and clearing annotations.
    ///
    /// The first page is rendered before anything is replaced, so a failure
    /// leaves the previous session as it was.
    pub fn open_document(&mut self, path: &Path) -> AnnotatorResult<RgbaImage> {
        let (document, rendered) = self.open_and_render(path)?;

        self.replace_document(document);
        self.store.clear();
        self.transform = Some(rendered.transform);
        log::info!(
            "opened {} ({} page(s))",
            path.display(),
            self.page_count().unwrap_or_default()
        );
        Ok(rendered.raster)
    }

    /// Close the open document, if any, and clear annotations.
    pub fn close_document(&mut self) {
        self.replace_document_with(None);
        self.store.clear();
        self.transform = None;
    }

    /// Re-render the current page and refresh the transform.
    pub fn render_current_page(&mut self) -> AnnotatorResult<RgbaImage> {
        let handle = self.open_handle()?;
        let rendered = self.render(handle, self.current_page)?;
        self.transform = Some(rendered.transform);
        Ok(rendered.raster)
    }

    /// Move to the next page. Returns the new raster, or `None` on the last page.
    pub fn next_page(&mut self) -> AnnotatorResult<Option<RgbaImage>> {
        let page_count = self.document.as_ref().ok_or(AnnotatorError::NoDocument)?.page_count;
        if self.current_page + 1 >= page_count {
            return Ok(None);
        }
        self.go_to_page(self.current_page + 1).map(Some)
    }

    /// Move to the previous page. Returns the new raster, or `None` on the first page.
    pub fn previous_page(&mut self) -> AnnotatorResult<Option<RgbaImage>> {
        if self.document.is_none() {
            return Err(AnnotatorError::NoDocument);
        }
        if self.current_page == 0 {
            return Ok(None);
        }
        self.go_to_page(self.current_page - 1).map(Some)
    }

    /// Jump to `page`. Any in-flight drag is dropped since its boxes belong
    /// to the old page.
    pub fn go_to_page(&mut self, page: u32) -> AnnotatorResult<RgbaImage> {
        let document = self.document.as_ref().ok_or(AnnotatorError::NoDocument)?;
        if page >= document.page_count {
            return Err(AnnotatorError::PageOutOfRange {
                page,
                page_count: document.page_count,
            });
        }

        let rendered = self.render(document.handle, page)?;
        if page != self.current_page {
            self.interaction.reset();
        }
        self.current_page = page;
        self.transform = Some(rendered.transform);
        Ok(rendered.raster)
    }

    /// `"Page: n / N"`, or `"Page: - / -"` with no document open
    pub fn page_label(&self) -> String {
        match &self.document {
            Some(document) => format!("Page: {} / {}", self.current_page + 1, document.page_count),
            None => "Page: - / -".to_string(),
        }
    }

    /// Feed a pointer event on the current page to the state machine.
    pub fn pointer(
        &mut self,
        event: PointerEvent,
        pending: &PendingAnnotationConfig,
    ) -> AnnotatorResult<InteractionOutcome> {
        if self.document.is_none() {
            return Err(AnnotatorError::NoDocument);
        }
        let transform = self.transform.ok_or(AnnotatorError::NoDocument)?;
        let ctx = InteractionContext {
            page: self.current_page,
            transform: &transform,
            config: &self.config,
        };
        self.interaction
            .handle_event(&mut self.store, ctx, event, pending)
    }

    /// Current page's annotations in display space, for redraw
    pub fn display_boxes(&self) -> Vec<DisplayAnnotation> {
        match (&self.document, &self.transform) {
            (Some(_), Some(transform)) => project_page(
                &self.store,
                self.current_page,
                transform,
                self.config.handle_half_size,
            ),
            _ => Vec::new(),
        }
    }

    pub fn save_project(&self, project_path: &Path) -> AnnotatorResult<()> {
        let document = self.document.as_ref().ok_or(AnnotatorError::NoDocument)?;
        persistence::save_project(project_path, &document.path, &self.store)
    }

    /// Load a project and open its document.
    ///
    /// Every check (document present, records valid, pages in range, first
    /// page renders) runs before the session is touched; on any failure the
    /// current document, page and annotations stay as they were.
    pub fn load_project(&mut self, project_path: &Path) -> AnnotatorResult<RgbaImage> {
        let project = read_project(project_path)?;
        let pdf_path = resolve_document(project_path, &project.pdf_path)?;
        let store = project.to_store(self.config.limits())?;

        let (document, rendered) = self.open_and_render(&pdf_path)?;
        if let Some(page) = project.max_page().filter(|page| *page >= document.page_count) {
            self.close_quietly(document.handle);
            return Err(AnnotatorError::PageOutOfRange {
                page,
                page_count: document.page_count,
            });
        }

        self.replace_document(document);
        self.store = store;
        self.transform = Some(rendered.transform);
        log::info!(
            "loaded project {} with {} annotation(s)",
            project_path.display(),
            self.store.len()
        );
        Ok(rendered.raster)
    }

    pub fn export_instructions(&self) -> AnnotatorResult<Vec<DrawInstruction>> {
        export_instructions(&self.store)
    }

    /// Start painting the annotations onto a copy of the document in the
    /// background.
    pub fn start_export<W>(&self, output: &Path, writer: W) -> AnnotatorResult<ExportHandle>
    where
        W: PdfWriter + Send + 'static,
    {
        let document = self.document.as_ref().ok_or(AnnotatorError::NoDocument)?;
        let instructions = export_instructions(&self.store)?;
        spawn_export(
            ExportJob {
                source: document.path.clone(),
                output: output.to_path_buf(),
                instructions,
            },
            writer,
        )
    }

    fn open_handle(&self) -> AnnotatorResult<DocumentHandle> {
        self.document
            .as_ref()
            .map(|doc| doc.handle)
            .ok_or(AnnotatorError::NoDocument)
    }

    fn open_and_render(&mut self, path: &Path) -> AnnotatorResult<(OpenDocument, PageView)> {
        let handle = self.engine.open(OpenSource::from(path))?;
        let opened = self
            .engine
            .page_count(handle)
            .map_err(AnnotatorError::from)
            .and_then(|page_count| {
                if page_count == 0 {
                    return Err(AnnotatorError::PageOutOfRange {
                        page: 0,
                        page_count,
                    });
                }
                let rendered = self.render(handle, 0)?;
                Ok((
                    OpenDocument {
                        path: path.to_path_buf(),
                        handle,
                        page_count,
                    },
                    rendered,
                ))
            });

        if opened.is_err() {
            self.close_quietly(handle);
        }
        opened
    }

    fn render(&self, handle: DocumentHandle, page: u32) -> AnnotatorResult<PageView> {
        let rendered = self.engine.render_page(
            handle,
            RenderRequest { page_index: page, scale: self.config.zoom as f32 },
        )?;
        let (pixel_width, pixel_height) = rendered.pixel_size();

        let transform = CoordinateTransform::from_dimensions(
            f64::from(rendered.page_size.width_pt),
            f64::from(rendered.page_size.height_pt),
            f64::from(pixel_width),
            f64::from(pixel_height),
        )
        .ok_or_else(|| {
            AnnotatorError::Engine(PdfEngineError::Backend(format!(
                "page {page} has no drawable area"
            )))
        })?;

        Ok(PageView { transform, raster: rendered.raster })
    }

    fn replace_document(&mut self, document: OpenDocument) {
        self.replace_document_with(Some(document));
    }

    fn replace_document_with(&mut self, document: Option<OpenDocument>) {
        if let Some(previous) = std::mem::replace(&mut self.document, document) {
            self.close_quietly(previous.handle);
        }
        self.current_page = 0;
        self.interaction.reset();
    }

    fn close_quietly(&mut self, handle: DocumentHandle) {
        if let Err(err) = self.engine.close(handle) {
            log::warn!("failed to close document handle {}: {err}", handle.raw());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationId;
    use crate::interaction::PointerButton;
    use crate::transform::ScreenPoint;
    use pdf_engine::{blank_document, LopdfEngine, PageSize};
    use std::fs;
    use tempfile::TempDir;

    const LETTER: PageSize = PageSize::LETTER;

    fn write_pdf(dir: &TempDir, name: &str, pages: &[PageSize]) -> PathBuf {
        let path = dir.path().join(name);
        let bytes = blank_document(pages).expect("blank document should build");
        fs::write(&path, bytes).expect("document should be written");
        path
    }

    fn session() -> EditorSession<LopdfEngine> {
        EditorSession::new(LopdfEngine::new(), EditorConfig::default())
    }

    fn press(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Press {
            point: ScreenPoint::new(x, y),
            button: PointerButton::Primary,
        }
    }

    #[test]
    fn open_document_renders_first_page() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let pdf = write_pdf(&temp, "doc.pdf", &[LETTER, LETTER]);
        let mut session = session();
        assert_eq!(session.page_label(), "Page: - / -");

        let raster = session.open_document(&pdf).expect("open should succeed");
        assert_eq!((raster.width(), raster.height()), (918, 1188));
        assert_eq!(session.page_label(), "Page: 1 / 2");

        let transform = session.transform().expect("page was rendered");
        assert_eq!(transform.scale_x(), 1.5);
        assert_eq!(transform.scale_y(), 1.5);
    }

    #[test]
    fn page_navigation_clamps() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let pdf = write_pdf(&temp, "doc.pdf", &[LETTER, LETTER]);
        let mut session = session();
        session.open_document(&pdf).expect("open should succeed");

        assert!(session.previous_page().expect("navigation").is_none());
        assert!(session.next_page().expect("navigation").is_some());
        assert_eq!(session.page_label(), "Page: 2 / 2");
        assert!(session.next_page().expect("navigation").is_none());
        assert_eq!(session.current_page(), 1);
    }

    #[test]
    fn page_change_drops_active_drag() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let pdf = write_pdf(&temp, "doc.pdf", &[LETTER, LETTER]);
        let mut session = session();
        session.open_document(&pdf).expect("open should succeed");

        let pending = PendingAnnotationConfig::new("Hello");
        session.pointer(press(30.0, 30.0), &pending).expect("placement");
        session.pointer(press(60.0, 40.0), &pending).expect("drag start");
        assert!(session.interaction().is_dragging());

        session.next_page().expect("navigation");
        assert!(!session.interaction().is_dragging());
        assert!(session.display_boxes().is_empty());
    }

    #[test]
    fn pointer_without_document_is_an_error() {
        let mut session = session();
        let err = session
            .pointer(press(1.0, 1.0), &PendingAnnotationConfig::new("x"))
            .expect_err("no document open");
        assert!(matches!(err, AnnotatorError::NoDocument));
    }

    #[test]
    fn opening_a_new_document_clears_annotations() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let first = write_pdf(&temp, "a.pdf", &[LETTER]);
        let second = write_pdf(&temp, "b.pdf", &[LETTER]);
        let mut session = session();
        session.open_document(&first).expect("open should succeed");
        session
            .pointer(press(10.0, 10.0), &PendingAnnotationConfig::new("x"))
            .expect("placement");
        assert_eq!(session.store().len(), 1);

        session.open_document(&second).expect("open should succeed");
        assert!(session.store().is_empty());
        assert_eq!(session.store().next_id(), AnnotationId::new(1));
    }

    #[test]
    fn failed_open_keeps_previous_document() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let pdf = write_pdf(&temp, "doc.pdf", &[LETTER]);
        let garbage = temp.path().join("garbage.pdf");
        fs::write(&garbage, b"not a pdf").expect("file should be written");

        let mut session = session();
        session.open_document(&pdf).expect("open should succeed");
        session
            .pointer(press(10.0, 10.0), &PendingAnnotationConfig::new("x"))
            .expect("placement");

        assert!(session.open_document(&garbage).is_err());
        assert_eq!(session.document_path(), Some(pdf.as_path()));
        assert_eq!(session.store().len(), 1);
    }

    #[test]
    fn save_and_load_project_round_trips() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let pdf = write_pdf(&temp, "doc.pdf", &[LETTER, LETTER]);
        let project = temp.path().join("doc.json");

        let mut session = session();
        session.open_document(&pdf).expect("open should succeed");
        session
            .pointer(press(150.0, 150.0), &PendingAnnotationConfig::new("first").with_color("red"))
            .expect("placement");
        session.next_page().expect("navigation");
        session
            .pointer(press(300.0, 90.0), &PendingAnnotationConfig::new("second"))
            .expect("placement");
        session.save_project(&project).expect("save should succeed");

        let mut restored = EditorSession::new(LopdfEngine::new(), EditorConfig::default());
        restored.load_project(&project).expect("load should succeed");

        let before: Vec<_> = session.store().iter().cloned().collect();
        let after: Vec<_> = restored.store().iter().cloned().collect();
        assert_eq!(before, after);
        assert_eq!(restored.current_page(), 0);
        assert_eq!(restored.display_boxes().len(), 1);
        assert_eq!(
            restored.export_instructions().expect("export"),
            session.export_instructions().expect("export")
        );
    }

    #[test]
    fn load_with_missing_document_leaves_session_untouched() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let pdf = write_pdf(&temp, "doc.pdf", &[LETTER, LETTER]);
        let project = temp.path().join("orphan.json");
        fs::write(
            &project,
            r#"{ "pdf_path": "/definitely/not/here.pdf", "annotations": [] }"#,
        )
        .expect("project should be written");

        let mut session = session();
        session.open_document(&pdf).expect("open should succeed");
        session
            .pointer(press(10.0, 10.0), &PendingAnnotationConfig::new("keep"))
            .expect("placement");
        session.next_page().expect("navigation");

        let err = session.load_project(&project).expect_err("document is missing");
        assert!(matches!(err, AnnotatorError::DocumentMissing(_)));
        assert_eq!(session.document_path(), Some(pdf.as_path()));
        assert_eq!(session.current_page(), 1);
        assert_eq!(session.store().len(), 1);
    }

    #[test]
    fn load_rejects_pages_beyond_document() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let pdf = write_pdf(&temp, "doc.pdf", &[LETTER]);
        let project = temp.path().join("doc.json");
        let json = serde_json::json!({
            "pdf_path": pdf,
            "annotations": [
                { "id": 1, "page": 3, "x_pdf": 0.0, "y_pdf": 0.0, "text": "far" }
            ]
        });
        fs::write(&project, json.to_string()).expect("project should be written");

        let mut session = session();
        let err = session.load_project(&project).expect_err("page 3 does not exist");
        assert!(matches!(
            err,
            AnnotatorError::PageOutOfRange {
                page: 3,
                page_count: 1
            }
        ));
        assert!(session.document_path().is_none());
    }

    #[test]
    fn export_runs_in_background() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let pdf = write_pdf(&temp, "doc.pdf", &[LETTER]);
        let output = temp.path().join("annotated.pdf");

        let mut session = session();
        session.open_document(&pdf).expect("open should succeed");
        assert!(matches!(
            session.start_export(&output, pdf_engine::LopdfWriter::new()),
            Err(AnnotatorError::NothingToExport)
        ));

        session
            .pointer(press(108.0, 108.0), &PendingAnnotationConfig::new("Hi"))
            .expect("placement");
        let handle = session
            .start_export(&output, pdf_engine::LopdfWriter::new())
            .expect("export should start");
        assert_eq!(handle.wait().expect("export should succeed"), output);
        assert!(output.is_file());
    }
}
