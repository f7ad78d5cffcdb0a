use annotator_core::{
    export_instructions, load_project, save_project, spawn_export, AnnotationId, AnnotationStore,
    AnnotatorError, DrawInstruction, EditorConfig, ExportEvent, ExportJob, LoadedProject,
    PagePoint,
};
use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use pdf_engine::{default_engine, LopdfWriter, OpenSource, PdfEngine};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "annotator-cli")]
#[command(about = "Place text annotations on PDF pages")]
pub struct Cli {
    /// Editor configuration file (JSON). Defaults apply when omitted.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Create an empty project for a PDF.
    New {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        project: PathBuf,
    },
    /// Add a text annotation and print its id.
    Add {
        #[arg(long)]
        project: PathBuf,
        /// Zero-based page index
        #[arg(long, default_value_t = 0)]
        page: u32,
        /// Left edge in document points from the page's top-left corner
        #[arg(long, allow_negative_numbers = true)]
        x: f64,
        /// Top edge in document points from the page's top-left corner
        #[arg(long, allow_negative_numbers = true)]
        y: f64,
        #[arg(long)]
        text: String,
        /// Font size; defaults to the configured staged size
        #[arg(long)]
        size: Option<u32>,
        #[arg(long, default_value = "black")]
        color: String,
        /// Anchor at a point instead of a resizable box
        #[arg(long)]
        point: bool,
    },
    /// Remove an annotation by id. Removing an unknown id succeeds.
    Remove {
        #[arg(long)]
        project: PathBuf,
        #[arg(value_name = "ID")]
        id: u64,
    },
    /// Print the project's draw instructions as JSON.
    List {
        #[arg(long)]
        project: PathBuf,
    },
    /// Paint the annotations onto a copy of the PDF.
    Export {
        #[arg(long)]
        project: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::New { file, project } => run_new(&file, &project),
        Commands::Add { project, page, x, y, text, size, color, point } => {
            let request = AddRequest { page, position: PagePoint::new(x, y), text, size, color, point };
            run_add(&config, &project, request)
        }
        Commands::Remove { project, id } => run_remove(&config, &project, AnnotationId::new(id)),
        Commands::List { project } => run_list(&config, &project),
        Commands::Export { project, output } => run_export(&config, &project, &output),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    // a second init in the same process keeps the first logger
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<EditorConfig> {
    let config = match path {
        Some(path) => EditorConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EditorConfig::default(),
    };
    config.with_env_overrides().context("invalid configuration override")
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    let pages = (0..page_count)
        .map(|page| {
            engine
                .page_size(handle, page)
                .map(|size| PageSizeOutput { width: size.width_pt, height: size.height_pt })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let payload = InfoOutput { path: file.display().to_string(), page_count, pages };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    engine.close(handle)?;

    Ok(())
}

fn run_new(file: &Path, project: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;
    document_page_count(file)?;

    let pdf_path = fs::canonicalize(file)
        .with_context(|| format!("failed to resolve {}", file.display()))?;
    save_project(project, &pdf_path, &AnnotationStore::new())
        .with_context(|| format!("failed to write project {}", project.display()))?;

    println!("{}", project.display());
    Ok(())
}

struct AddRequest {
    page: u32,
    position: PagePoint,
    text: String,
    size: Option<u32>,
    color: String,
    point: bool,
}

fn run_add(config: &EditorConfig, project: &Path, request: AddRequest) -> Result<()> {
    let LoadedProject { pdf_path, mut store } = open_project(config, project)?;

    let page_count = document_page_count(&pdf_path)?;
    if request.page >= page_count {
        return Err(AnnotatorError::PageOutOfRange { page: request.page, page_count }.into());
    }

    let font_size =
        config.clamp_staged_font_size(request.size.unwrap_or(config.default_font_size));
    let size = (!request.point).then(|| config.default_box_size(font_size));

    let id = store
        .create(request.page, request.position, size, &request.text, font_size, &request.color)
        .context("failed to add annotation")?;
    save_project(project, &pdf_path, &store)
        .with_context(|| format!("failed to write project {}", project.display()))?;

    println!("{}", id.raw());
    Ok(())
}

fn run_remove(config: &EditorConfig, project: &Path, id: AnnotationId) -> Result<()> {
    let LoadedProject { pdf_path, mut store } = open_project(config, project)?;

    if !store.delete(id) {
        log::info!("annotation {id} was not in the project");
    }
    save_project(project, &pdf_path, &store)
        .with_context(|| format!("failed to write project {}", project.display()))?;
    Ok(())
}

fn run_list(config: &EditorConfig, project: &Path) -> Result<()> {
    let LoadedProject { store, .. } = open_project(config, project)?;

    let instructions: Vec<DrawInstruction> = match export_instructions(&store) {
        Ok(instructions) => instructions,
        Err(AnnotatorError::NothingToExport) => Vec::new(),
        Err(err) => return Err(err.into()),
    };

    let json = serde_json::to_string_pretty(&instructions)?;
    println!("{json}");
    Ok(())
}

fn run_export(config: &EditorConfig, project: &Path, output: &Path) -> Result<()> {
    let LoadedProject { pdf_path, store } = open_project(config, project)?;
    let instructions = export_instructions(&store).context("nothing to export")?;

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let job = ExportJob { source: pdf_path, output: output.to_path_buf(), instructions };
    let handle = spawn_export(job, LopdfWriter::new()).context("failed to start export")?;

    while let Some(event) = handle.next_event() {
        match event {
            ExportEvent::PageDone { pages_done, total_pages } => {
                log::info!("exported page {pages_done}/{total_pages}");
            }
            ExportEvent::Finished(_) => break,
        }
    }

    let written = handle.wait().context("export failed")?;
    println!("{}", written.display());
    Ok(())
}

fn open_project(config: &EditorConfig, project: &Path) -> Result<LoadedProject> {
    load_project(project, config.limits())
        .with_context(|| format!("failed to load project {}", project.display()))
}

fn document_page_count(file: &Path) -> Result<u32> {
    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;
    let page_count = engine.page_count(handle)?;
    engine.close(handle)?;
    Ok(page_count)
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
