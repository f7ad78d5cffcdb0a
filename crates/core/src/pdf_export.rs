//! Export mapping from annotations to draw instructions
//!
//! The store already holds document units, so export is a projection: each
//! annotation becomes one instruction with its stored position unchanged.
//! Painting the instructions onto pages is left to a [`pdf_engine::PdfWriter`].

use crate::annotation::{AnnotationStore, Rgb};
use crate::error::{AnnotatorError, AnnotatorResult};
use crate::transform::PagePoint;
use pdf_engine::TextRun;
use serde::Serialize;
use std::collections::BTreeMap;

/// Text to paint at a document-space position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawInstruction {
    pub page: u32,
    pub position: PagePoint,
    pub text: String,
    pub font_size: u32,
    pub color: Rgb,
}

impl From<&DrawInstruction> for TextRun {
    fn from(instruction: &DrawInstruction) -> Self {
        TextRun {
            x: instruction.position.x as f32,
            y: instruction.position.y as f32,
            text: instruction.text.clone(),
            font_size: instruction.font_size as f32,
            rgb: [
                instruction.color.r as f32,
                instruction.color.g as f32,
                instruction.color.b as f32,
            ],
        }
    }
}

/// One instruction per annotation, ordered by page then creation.
///
/// # Errors
/// [`AnnotatorError::NothingToExport`] when the store is empty.
pub fn export_instructions(store: &AnnotationStore) -> AnnotatorResult<Vec<DrawInstruction>> {
    if store.is_empty() {
        return Err(AnnotatorError::NothingToExport);
    }

    let mut instructions: Vec<DrawInstruction> = store
        .iter()
        .map(|annotation| DrawInstruction {
            page: annotation.page(),
            position: annotation.position(),
            text: annotation.text().to_string(),
            font_size: annotation.font_size(),
            color: annotation.color().rgb(),
        })
        .collect();
    // stable: creation order survives within a page
    instructions.sort_by_key(|instruction| instruction.page);
    Ok(instructions)
}

/// Group instructions into per-page text runs, pages ascending.
pub fn runs_by_page(instructions: &[DrawInstruction]) -> BTreeMap<u32, Vec<TextRun>> {
    let mut pages: BTreeMap<u32, Vec<TextRun>> = BTreeMap::new();
    for instruction in instructions {
        pages
            .entry(instruction.page)
            .or_default()
            .push(TextRun::from(instruction));
    }
    pages
}
