//! Background export worker
//!
//! Painting annotations onto a document can take seconds per page, so export
//! runs on its own thread. The worker receives the draw instructions by value
//! and never touches the annotation store. Progress flows back one way over a
//! channel; a [`CancellationToken`] is checked before each page.

use crate::cancel::CancellationToken;
use crate::error::{AnnotatorError, AnnotatorResult};
use crate::pdf_export::{runs_by_page, DrawInstruction};
use pdf_engine::PdfWriter;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

/// Everything the worker needs, owned
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub source: PathBuf,
    pub output: PathBuf,
    pub instructions: Vec<DrawInstruction>,
}

/// Notification from the worker
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    /// Sent after each page that received text
    PageDone { pages_done: u32, total_pages: u32 },
    /// Sent exactly once, last
    Finished(Result<PathBuf, String>),
}

/// Paint `job` with `writer`, reporting each finished page to `on_page`.
///
/// Every instruction's page is checked against the document before anything
/// is painted. Nothing is written to `job.output` unless all pages succeed.
pub fn run_export<W, F>(
    job: &ExportJob,
    writer: &mut W,
    token: &CancellationToken,
    mut on_page: F,
) -> AnnotatorResult<PathBuf>
where
    W: PdfWriter + ?Sized,
    F: FnMut(u32, u32),
{
    if job.instructions.is_empty() {
        return Err(AnnotatorError::NothingToExport);
    }

    let page_count = writer.open(&job.source)?;
    if let Some(bad) = job
        .instructions
        .iter()
        .find(|instruction| instruction.page >= page_count)
    {
        return Err(AnnotatorError::PageOutOfRange {
            page: bad.page,
            page_count,
        });
    }

    let pages = runs_by_page(&job.instructions);
    let total_pages = pages.len() as u32;
    let mut pages_done = 0;

    for (page, runs) in &pages {
        if token.is_cancelled() {
            log::warn!("export cancelled after {pages_done} of {total_pages} page(s)");
            return Err(AnnotatorError::Cancelled { pages_done });
        }
        writer.paint_page(*page, runs)?;
        pages_done += 1;
        log::debug!("painted page {page} ({pages_done}/{total_pages})");
        on_page(pages_done, total_pages);
    }

    writer.save(&job.output)?;
    log::info!(
        "exported {} annotation(s) to {}",
        job.instructions.len(),
        job.output.display()
    );
    Ok(job.output.clone())
}

/// Handle to a running export
pub struct ExportHandle {
    events: Receiver<ExportEvent>,
    token: CancellationToken,
    thread: JoinHandle<AnnotatorResult<PathBuf>>,
}

impl ExportHandle {
    /// Ask the worker to stop before its next page.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Next pending event without blocking
    pub fn try_next_event(&self) -> Option<ExportEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Block for the next event; `None` once the worker is gone.
    pub fn next_event(&self) -> Option<ExportEvent> {
        self.events.recv().ok()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker and return its result.
    pub fn wait(self) -> AnnotatorResult<PathBuf> {
        self.thread
            .join()
            .map_err(|_| AnnotatorError::WorkerPanicked)?
    }
}

/// Start `job` on a dedicated thread.
pub fn spawn_export<W>(job: ExportJob, writer: W) -> AnnotatorResult<ExportHandle>
where
    W: PdfWriter + Send + 'static,
{
    spawn_export_with_token(job, writer, CancellationToken::new())
}

/// Like [`spawn_export`], with a caller-supplied token.
pub fn spawn_export_with_token<W>(
    job: ExportJob,
    mut writer: W,
    token: CancellationToken,
) -> AnnotatorResult<ExportHandle>
where
    W: PdfWriter + Send + 'static,
{
    let (sender, events) = mpsc::channel();
    let worker_token = token.clone();

    let thread = thread::Builder::new()
        .name("annotator-export".to_string())
        .spawn(move || export_thread(job, &mut writer, &worker_token, &sender))?;

    Ok(ExportHandle {
        events,
        token,
        thread,
    })
}

fn export_thread<W: PdfWriter>(
    job: ExportJob,
    writer: &mut W,
    token: &CancellationToken,
    sender: &Sender<ExportEvent>,
) -> AnnotatorResult<PathBuf> {
    let result = run_export(&job, writer, token, |pages_done, total_pages| {
        // the receiver may be gone; the export still completes
        let _ = sender.send(ExportEvent::PageDone {
            pages_done,
            total_pages,
        });
    });

    let summary = match &result {
        Ok(path) => Ok(path.clone()),
        Err(err) => Err(err.to_string()),
    };
    let _ = sender.send(ExportEvent::Finished(summary));
    result
}
