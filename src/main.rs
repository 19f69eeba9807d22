//! # Cardsmith CLI
//!
//! Headless front-end over `cardsmith-core`.
//!
//! ## Commands
//! - `render`: render one scene with one row of form data to a file
//! - `batch`: render one file per form-data row, in parallel
//! - `layout`: print the resolved pixel geometry of every visible layer

use anyhow::{bail, Context, Result};
use cardsmith_core::batch::{image_cache, render_job};
use cardsmith_core::layout::resolve_scene;
use cardsmith_core::{
    run_batch, BatchJob, DefaultAssetLoader, FontBook, FormData, JobOutcome, OutputFormat,
    QualityTier, RenderOptions, Scene,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cardsmith")]
#[command(about = "Render certificate and card templates")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct OutputArgs {
    /// Directory of Family-Weight.ttf/.otf fonts
    #[arg(long)]
    fonts: Option<PathBuf>,

    /// Render options JSON (format, quality, backgroundFallback, imageTimeoutMs)
    #[arg(long)]
    options: Option<PathBuf>,

    /// Output format; overrides the options file
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Quality tier; overrides the options file
    #[arg(long, value_enum)]
    quality: Option<QualityArg>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum FormatArg {
    Png,
    Jpeg,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum QualityArg {
    Low,
    Medium,
    High,
    Ultra,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one scene with one row of form data
    Render {
        /// Scene JSON document
        #[arg(short, long)]
        scene: PathBuf,

        /// Form data JSON object
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Render one output per row of a JSON array of form data
    Batch {
        #[arg(short, long)]
        scene: PathBuf,

        /// JSON array of form data objects
        #[arg(short, long)]
        rows: PathBuf,

        /// Output directory (created if missing)
        #[arg(short = 'o', long)]
        out_dir: PathBuf,

        /// Worker threads (defaults to one per core)
        #[arg(short, long)]
        jobs: Option<usize>,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Print resolved layer geometry for a target width
    Layout {
        #[arg(short, long)]
        scene: PathBuf,

        /// Surface width in pixels (defaults to the template width)
        #[arg(short, long)]
        width: Option<f32>,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_scene(path: &Path) -> Result<Scene> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scene: {}", path.display()))?;
    Scene::from_json(&json).with_context(|| format!("Invalid scene: {}", path.display()))
}

/// Form values may be any JSON scalar; they are substituted as text.
fn form_row(value: serde_json::Value) -> Result<FormData> {
    let serde_json::Value::Object(map) = value else {
        bail!("Form data row must be a JSON object");
    };
    Ok(map
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, text)
        })
        .collect())
}

fn load_json(path: &Path) -> Result<serde_json::Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

impl OutputArgs {
    fn render_options(&self) -> Result<RenderOptions> {
        let mut options = match &self.options {
            Some(path) => serde_json::from_value(load_json(path)?)
                .with_context(|| format!("Invalid render options: {}", path.display()))?,
            None => RenderOptions::default(),
        };
        if let Some(format) = self.format {
            options.format = match format {
                FormatArg::Png => OutputFormat::Png,
                FormatArg::Jpeg => OutputFormat::Jpeg,
            };
        }
        if let Some(quality) = self.quality {
            options.quality = match quality {
                QualityArg::Low => QualityTier::Low,
                QualityArg::Medium => QualityTier::Medium,
                QualityArg::High => QualityTier::High,
                QualityArg::Ultra => QualityTier::Ultra,
            };
        }
        Ok(options)
    }

    fn font_book(&self) -> Result<FontBook> {
        let mut fonts = FontBook::new();
        match &self.fonts {
            Some(dir) => {
                let count = fonts
                    .load_dir(dir)
                    .with_context(|| format!("Failed to load fonts from {}", dir.display()))?;
                tracing::info!("Loaded {} font faces from {}", count, dir.display());
            }
            None => tracing::warn!("No --fonts directory given; text layers will be skipped"),
        }
        Ok(fonts)
    }
}

fn render(scene: &Path, data: Option<&Path>, output: &Path, out: &OutputArgs) -> Result<()> {
    let scene = load_scene(scene)?;
    let form = match data {
        Some(path) => form_row(load_json(path)?)?,
        None => FormData::new(),
    };
    let options = out.render_options()?;
    let fonts = out.font_book()?;
    let images = image_cache(Arc::new(DefaultAssetLoader), &options);

    let job = BatchJob::new(0, scene, form, options);
    let (bytes, report) = render_job(&job, &images, &fonts).context("Render failed")?;
    for warning in &report.warnings {
        tracing::warn!("{}", warning.message);
    }
    fs::write(output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    tracing::info!("Wrote {} ({} bytes)", output.display(), bytes.len());
    Ok(())
}

fn batch(
    scene: &Path,
    rows: &Path,
    out_dir: &Path,
    jobs: Option<usize>,
    out: &OutputArgs,
) -> Result<()> {
    if let Some(threads) = jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure worker pool")?;
    }

    let scene = load_scene(scene)?;
    let serde_json::Value::Array(rows) = load_json(rows)? else {
        bail!("Rows file must contain a JSON array");
    };
    let options = out.render_options()?;
    let fonts = out.font_book()?;
    let images = image_cache(Arc::new(DefaultAssetLoader), &options);

    let mut batch_jobs = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        let form = form_row(row).with_context(|| format!("Row {}", index))?;
        batch_jobs.push(BatchJob::new(index, scene.clone(), form, options.clone()));
    }

    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let outcomes = run_batch(&batch_jobs, &images, &fonts);

    let mut failed = 0;
    for outcome in &outcomes {
        match outcome {
            JobOutcome::Rendered { index, bytes, .. } => {
                let path = out_dir.join(format!("{:04}.{}", index, options.format.extension()));
                fs::write(&path, bytes)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            JobOutcome::Failed { index, reason } => {
                failed += 1;
                eprintln!("row {}: {}", index, reason);
            }
        }
    }

    println!("{} rendered, {} failed", outcomes.len() - failed, failed);
    if !outcomes.is_empty() && failed == outcomes.len() {
        bail!("Every row failed");
    }
    Ok(())
}

#[derive(Serialize)]
struct LayoutDump {
    width: f32,
    height: f32,
    scale: f32,
    placements: Vec<cardsmith_core::Placement>,
}

fn layout(scene: &Path, width: Option<f32>) -> Result<()> {
    let scene = load_scene(scene)?;
    let width = width.unwrap_or(scene.background.width as f32);
    let normalizer = scene.normalizer(width)?;
    let surface = normalizer.surface();
    let dump = LayoutDump {
        width: surface.width,
        height: surface.height,
        scale: normalizer.scale(),
        placements: resolve_scene(&scene, &normalizer),
    };
    println!("{}", serde_json::to_string_pretty(&dump)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Render {
            scene,
            data,
            output,
            out,
        } => render(&scene, data.as_deref(), &output, &out),
        Commands::Batch {
            scene,
            rows,
            out_dir,
            jobs,
            out,
        } => batch(&scene, &rows, &out_dir, jobs, &out),
        Commands::Layout { scene, width } => layout(&scene, width),
    }
}
