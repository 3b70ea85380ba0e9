//! The `athena prepare` command: run the pipeline offline.
//!
//! Images are discovered on disk, pushed through the same stages a live
//! call would use, and summarized one record per wire request. Nothing is
//! sent to the service.

use athena_core::{Config, ImageData, OutputFormat as CoreOutputFormat, OutputWriter, Pipeline, RequestSummary};
use clap::{Args, ValueEnum};
use futures_util::stream::{self, Stream, StreamExt};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use walkdir::WalkDir;

/// File extensions picked up by discovery.
const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff"];

/// Supported output formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON array
    Json,
    /// One JSON object per line (newline-delimited)
    Jsonl,
}

impl From<OutputFormat> for CoreOutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => CoreOutputFormat::Json,
            OutputFormat::Jsonl => CoreOutputFormat::JsonLines,
        }
    }
}

/// Arguments for the `prepare` command.
#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Image file or directory
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Skip the resize stage even if enabled in config
    #[arg(long)]
    pub no_resize: bool,

    /// Skip the compression stage even if enabled in config
    #[arg(long)]
    pub no_compress: bool,

    /// Override the configured batch size
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Use file paths as correlation IDs instead of the configured strategy
    #[arg(long)]
    pub path_ids: bool,
}

/// Totals reported at the end of a run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PrepareStats {
    pub discovered: usize,
    pub unreadable: usize,
    pub failed: usize,
    pub requests: usize,
    pub inputs: usize,
}

/// Execute the prepare command.
pub async fn execute(args: PrepareArgs, config: Config) -> anyhow::Result<()> {
    let stats = run(&args, config).await?;
    tracing::info!(
        "Prepared {} request(s) carrying {} image(s); {} failed, {} unreadable",
        stats.requests,
        stats.inputs,
        stats.failed,
        stats.unreadable
    );
    Ok(())
}

async fn run(args: &PrepareArgs, mut config: Config) -> anyhow::Result<PrepareStats> {
    if args.no_resize {
        config.pipeline.resize_images = false;
    }
    if args.no_compress {
        config.pipeline.compress_images = false;
    }
    if let Some(batch_size) = args.batch_size {
        config.pipeline.batch_size = batch_size;
    }
    let pipeline = Pipeline::from_config(&config)?;

    let files = discover(&args.input);
    let mut stats = PrepareStats {
        discovered: files.len(),
        ..PrepareStats::default()
    };
    if files.is_empty() {
        tracing::warn!("No supported image files found at {:?}", args.input);
        return Ok(stats);
    }
    tracing::info!("Found {} image(s) to prepare", files.len());

    let unreadable = Arc::new(AtomicUsize::new(0));
    let images = read_images(files, args.path_ids, Arc::clone(&unreadable));

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = OutputWriter::new(sink, args.format.into());

    let mut requests = pipeline.run(images);
    while let Some(item) = requests.next().await {
        match item {
            Ok(request) => {
                stats.requests += 1;
                stats.inputs += request.inputs.len();
                writer.write(&RequestSummary::from(&request))?;
            }
            Err(e) => {
                stats.failed += 1;
                tracing::warn!("Skipping {}: {}", e.item(), e);
            }
        }
    }
    writer.finish()?.flush()?;
    stats.unreadable = unreadable.load(Ordering::Relaxed);

    if let Some(path) = &args.output {
        tracing::info!("Output written to {:?}", path);
    }
    Ok(stats)
}

/// Read files one at a time as the pipeline pulls them.
///
/// Unreadable files are logged, counted in `unreadable`, and skipped.
fn read_images(
    files: Vec<PathBuf>,
    path_ids: bool,
    unreadable: Arc<AtomicUsize>,
) -> impl Stream<Item = ImageData> + Send + 'static {
    stream::iter(files).filter_map(move |path| {
        let unreadable = Arc::clone(&unreadable);
        async move {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let image = ImageData::new(bytes);
                    Some(if path_ids {
                        image.with_correlation_id(path.display().to_string())
                    } else {
                        image
                    })
                }
                Err(e) => {
                    unreadable.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Cannot read {:?}: {}", path, e);
                    None
                }
            }
        }
    })
}

/// Find supported image files at `path`, sorted for deterministic order.
pub fn discover(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return if is_supported(path) {
            vec![path.to_path_buf()]
        } else {
            vec![]
        };
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}
