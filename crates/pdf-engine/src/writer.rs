//! Text painting onto an existing document.
//!
//! Runs are positioned in page space with the origin at the top-left corner;
//! the writer flips them into PDF user space (origin bottom-left) and places
//! the text baseline at the given point.

use crate::{load_unencrypted, media_box_of, MediaBox, PdfEngineError};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Resource name the built-in font is registered under on every painted page.
const FONT_RESOURCE: &str = "FAnnotHelv";

/// One piece of text to paint.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    /// Left edge of the baseline, page units from the left
    pub x: f32,
    /// Baseline, page units from the top
    pub y: f32,
    pub text: String,
    pub font_size: f32,
    /// Fill colour, each channel in [0, 1]
    pub rgb: [f32; 3],
}

/// Document writer.
///
/// A writer is opened on a source document, painted page by page, and then
/// saved to a new file. The source file itself is never modified.
pub trait PdfWriter {
    /// Load the source document and return its page count.
    fn open(&mut self, source: &Path) -> Result<u32, PdfEngineError>;
    fn paint_page(&mut self, page_index: u32, runs: &[TextRun]) -> Result<(), PdfEngineError>;
    fn save(&mut self, output: &Path) -> Result<(), PdfEngineError>;
}

#[derive(Debug, Default)]
pub struct LopdfWriter {
    doc: Option<Document>,
    pages: BTreeMap<u32, ObjectId>,
    font_id: Option<ObjectId>,
}

impl LopdfWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn font_id(&mut self) -> Result<ObjectId, PdfEngineError> {
        if let Some(id) = self.font_id {
            return Ok(id);
        }

        let doc = self.doc.as_mut().ok_or_else(not_open)?;
        let id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        self.font_id = Some(id);
        Ok(id)
    }
}

impl PdfWriter for LopdfWriter {
    fn open(&mut self, source: &Path) -> Result<u32, PdfEngineError> {
        let doc = load_unencrypted(&fs::read(source)?)?;
        // lopdf numbers pages from 1
        self.pages =
            doc.get_pages().into_iter().map(|(number, id)| (number.saturating_sub(1), id)).collect();
        self.doc = Some(doc);
        self.font_id = None;

        Ok(self.pages.len() as u32)
    }

    fn paint_page(&mut self, page_index: u32, runs: &[TextRun]) -> Result<(), PdfEngineError> {
        if runs.is_empty() {
            return Ok(());
        }

        let page_id = *self.pages.get(&page_index).ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: self.pages.len() as u32,
        })?;
        let font_id = self.font_id()?;
        let doc = self.doc.as_mut().ok_or_else(not_open)?;

        register_font(doc, page_id, font_id)?;
        isolate_existing_content(doc, page_id)?;

        let content = text_content(runs, media_box_of(doc, page_id));
        let bytes = content.encode()?;
        doc.add_page_contents(page_id, bytes)?;

        log::debug!("painted {} run(s) on page {}", runs.len(), page_index);
        Ok(())
    }

    fn save(&mut self, output: &Path) -> Result<(), PdfEngineError> {
        let doc = self.doc.as_mut().ok_or_else(not_open)?;

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).map_err(|err| PdfEngineError::Backend(err.to_string()))?;

        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(&buffer)?;
        temp.as_file().sync_all()?;
        temp.persist(output).map_err(|err| err.error)?;
        Ok(())
    }
}

fn not_open() -> PdfEngineError {
    PdfEngineError::Backend("writer has no open document".to_owned())
}

/// Put the annotation font into the page's own resource dictionary.
///
/// Inherited or referenced resources are copied onto the page so the
/// existing content keeps resolving every name it used before.
fn register_font(
    doc: &mut Document,
    page_id: ObjectId,
    font_id: ObjectId,
) -> Result<(), PdfEngineError> {
    let mut resources = effective_resources(doc, page_id);

    let mut fonts = match resources.get(b"Font") {
        Ok(Object::Dictionary(fonts)) => fonts.clone(),
        Ok(Object::Reference(id)) => {
            doc.get_dictionary(*id).cloned().unwrap_or_else(|_| Dictionary::new())
        }
        _ => Dictionary::new(),
    };
    fonts.set(FONT_RESOURCE, font_id);
    resources.set("Font", fonts);

    let page = doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
    page.set("Resources", resources);
    Ok(())
}

/// Wrap the page's existing content streams in `q`/`Q` so graphics state
/// they leave behind cannot leak into text painted after them.
fn isolate_existing_content(doc: &mut Document, page_id: ObjectId) -> Result<(), PdfEngineError> {
    let existing = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    if existing.is_empty() {
        return Ok(());
    }

    let save = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let restore = doc.add_object(Stream::new(dictionary! {}, b"\nQ\n".to_vec()));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(save));
    contents.extend(existing);
    contents.push(Object::Reference(restore));

    let page = doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
    page.set("Contents", contents);
    Ok(())
}

fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let Ok(dict) = doc.get_dictionary(id) else {
            break;
        };

        match dict.get(b"Resources") {
            Ok(Object::Dictionary(resources)) => return resources.clone(),
            Ok(Object::Reference(target)) => {
                if let Ok(resources) = doc.get_dictionary(*target) {
                    return resources.clone();
                }
            }
            _ => {}
        }

        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }

    Dictionary::new()
}

/// Text operations for `runs`, placed relative to the top-left corner of
/// `media_box`.
fn text_content(runs: &[TextRun], media_box: MediaBox) -> Content {
    let mut operations = vec![Operation::new("q", vec![])];

    for run in runs {
        let [r, g, b] = run.rgb;
        operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(FONT_RESOURCE.as_bytes().to_vec()), run.font_size.into()],
            ),
            Operation::new("rg", vec![r.into(), g.into(), b.into()]),
            Operation::new(
                "Tm",
                vec![
                    1.into(),
                    0.into(),
                    0.into(),
                    1.into(),
                    (media_box.left + run.x).into(),
                    (media_box.top - run.y).into(),
                ],
            ),
            Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(&run.text))]),
            Operation::new("ET", vec![]),
        ]);
    }

    operations.push(Operation::new("Q", vec![]));
    Content { operations }
}

/// Latin-1 subset of WinAnsi; anything else becomes `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(|ch| u8::try_from(u32::from(ch)).unwrap_or(b'?')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{blank_document, page_size_of, PageSize};

    fn write_source(dir: &Path, pages: usize) -> std::path::PathBuf {
        let sizes = vec![PageSize::LETTER; pages];
        let bytes = blank_document(&sizes).expect("blank document should build");
        let path = dir.join("source.pdf");
        fs::write(&path, bytes).expect("fixture should be written");
        path
    }

    fn edit_first_page(path: &Path, edit: impl FnOnce(&mut Document, ObjectId)) {
        let mut doc = Document::load(path).expect("fixture should parse");
        let page_id = doc.get_pages()[&1];
        edit(&mut doc, page_id);
        doc.save(path).expect("fixture should be saved");
    }

    fn paint_single_page(source: &Path, output: &Path) -> Content {
        let mut writer = LopdfWriter::new();
        writer.open(source).expect("open should succeed");
        writer.paint_page(0, &[run("Hi")]).expect("paint should succeed");
        writer.save(output).expect("save should succeed");

        let doc = Document::load(output).expect("output should parse");
        doc.get_and_decode_page_content(doc.get_pages()[&1]).expect("content should decode")
    }

    fn text_origin(content: &Content) -> (f32, f32) {
        let tm = content
            .operations
            .iter()
            .find(|op| op.operator == "Tm")
            .expect("text matrix should be present");
        (
            tm.operands[4].as_float().expect("x operand"),
            tm.operands[5].as_float().expect("y operand"),
        )
    }

    fn run(text: &str) -> TextRun {
        TextRun { x: 72.0, y: 72.0, text: text.to_owned(), font_size: 12.0, rgb: [1.0, 0.0, 0.0] }
    }

    #[test]
    fn painted_document_keeps_page_count_and_geometry() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let source = write_source(temp.path(), 2);
        let output = temp.path().join("out.pdf");

        let mut writer = LopdfWriter::new();
        assert_eq!(writer.open(&source).expect("open should succeed"), 2);
        writer.paint_page(1, &[run("Hi")]).expect("paint should succeed");
        writer.save(&output).expect("save should succeed");

        let doc = Document::load(&output).expect("output should parse");
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);
        let size = page_size_of(&doc, pages[&2]);
        assert_eq!(size, PageSize::LETTER);
    }

    #[test]
    fn painted_page_contains_text_at_flipped_baseline() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let source = write_source(temp.path(), 1);
        let output = temp.path().join("out.pdf");

        let mut writer = LopdfWriter::new();
        writer.open(&source).expect("open should succeed");
        writer.paint_page(0, &[run("Hi")]).expect("paint should succeed");
        writer.save(&output).expect("save should succeed");

        let doc = Document::load(&output).expect("output should parse");
        let page_id = doc.get_pages()[&1];
        let content = doc.get_and_decode_page_content(page_id).expect("content should decode");

        let tm = content
            .operations
            .iter()
            .find(|op| op.operator == "Tm")
            .expect("text matrix should be present");
        assert_eq!(tm.operands[5].as_float().expect("y operand"), 720.0);

        let tj = content
            .operations
            .iter()
            .find(|op| op.operator == "Tj")
            .expect("show-text operator should be present");
        assert_eq!(tj.operands[0].as_str().expect("string operand"), b"Hi");

        let fonts = doc
            .get_dictionary(page_id)
            .and_then(|page| page.get(b"Resources"))
            .and_then(Object::as_dict)
            .and_then(|resources| resources.get(b"Font"))
            .and_then(Object::as_dict)
            .expect("page should carry a font dictionary");
        assert!(fonts.has(FONT_RESOURCE.as_bytes()));
    }

    #[test]
    fn painting_unknown_page_fails() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let source = write_source(temp.path(), 1);

        let mut writer = LopdfWriter::new();
        writer.open(&source).expect("open should succeed");
        let err = writer.paint_page(3, &[run("x")]).expect_err("page 3 does not exist");

        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 3, page_count: 1 }));
    }

    #[test]
    fn paint_before_open_is_an_error() {
        let mut writer = LopdfWriter::new();
        assert!(writer.save(Path::new("/tmp/never.pdf")).is_err());
    }

    #[test]
    fn non_latin_characters_are_replaced() {
        assert_eq!(encode_win_ansi("aé→"), vec![b'a', 0xE9, b'?']);
    }

    #[test]
    fn text_is_placed_from_the_media_box_top_left() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let source = write_source(temp.path(), 1);
        edit_first_page(&source, |doc, page_id| {
            let page = doc
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
                .expect("page dictionary");
            page.set("MediaBox", vec![0.into(), 100.into(), 612.into(), 892.into()]);
        });

        let content = paint_single_page(&source, &temp.path().join("out.pdf"));
        assert_eq!(text_origin(&content), (72.0, 820.0));
    }

    #[test]
    fn existing_content_state_does_not_leak_into_text() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let source = write_source(temp.path(), 1);
        edit_first_page(&source, |doc, page_id| {
            let shifted = doc.add_object(Stream::new(dictionary! {}, b"1 0 0 1 50 50 cm\n".to_vec()));
            let page = doc
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
                .expect("page dictionary");
            page.set("Contents", shifted);
        });

        let content = paint_single_page(&source, &temp.path().join("out.pdf"));
        let operators: Vec<&str> =
            content.operations.iter().map(|op| op.operator.as_str()).collect();

        assert_eq!(&operators[..3], ["q", "cm", "Q"]);
        let text_start = operators.iter().position(|op| *op == "BT").expect("text block");
        assert!(text_start > 3);
        assert_eq!(
            operators.iter().filter(|op| **op == "q").count(),
            operators.iter().filter(|op| **op == "Q").count()
        );
    }

    #[test]
    fn save_overwrites_an_existing_tmp_named_output() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let source = write_source(temp.path(), 1);
        let output = temp.path().join("annotated.tmp");
        fs::write(&output, b"stale").expect("stale output should be written");

        paint_single_page(&source, &output);

        let names: Vec<_> = fs::read_dir(temp.path())
            .expect("dir should be readable")
            .map(|entry| entry.expect("dir entry").file_name())
            .collect();
        assert_eq!(names.len(), 2, "only the source and the output remain: {names:?}");
    }
}
