use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use clap::Parser;
use env_logger::{Env, TimestampPrecision};
use geo::FormatRasterSource;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use inf::progressinfo::{CallbackProgress, ComputationStatus, ProgressNotification};
use tiler::{BatchOptions, BatchProcessor, BatchReport, CheckpointStore, EdgeTilePolicy, TileFormat};

pub type Result<T> = anyhow::Result<T>;

const KM_PER_DEGREE: f64 = 111.0;
const PROGRESS_STEPS: u64 = 1000;
const MAX_REPORTED_FAILURES: usize = 20;

#[derive(Parser, Debug)]
#[clap(name = "splittiles", about = "Split georeferenced rasters in tiles of a fixed size in degrees")]
pub struct Opt {
    /// Directory that is searched recursively for source rasters
    pub source: PathBuf,

    /// Directory that receives the tiles and their world files
    pub destination: PathBuf,

    /// Tile edge length in degrees [default: 0.1]
    #[arg(long = "tile-size", value_name = "DEGREES", conflicts_with = "tile_size_km")]
    pub tile_size: Option<f64>,

    /// Tile edge length in kilometers, converted at 111 km per degree
    #[arg(long = "tile-size-km", value_name = "KM")]
    pub tile_size_km: Option<f64>,

    /// Number of tiles written concurrently [default: number of cpus]
    #[arg(long = "workers", short = 'j')]
    pub workers: Option<usize>,

    /// Source file extension, can be repeated [default: bil, tif, tiff]
    #[arg(long = "extension", short = 'e')]
    pub extensions: Vec<String>,

    #[arg(long = "format", default_value = "png", value_name = "png|tif")]
    pub format: TileFormat,

    #[arg(long = "edge-tiles", default_value = "drop", value_name = "drop|pad")]
    pub edge_tiles: EdgeTilePolicy,

    #[arg(long = "checkpoint", default_value = "checkpoint.json")]
    pub checkpoint: PathBuf,

    /// Also save the checkpoint after every N completed tiles
    #[arg(long = "checkpoint-every", value_name = "N")]
    pub checkpoint_every: Option<usize>,

    /// Start from the first file, existing tiles are still skipped
    #[arg(long = "ignore-checkpoint")]
    pub ignore_checkpoint: bool,

    #[arg(long = "noprogress")]
    pub no_progress: bool,
}

impl Opt {
    fn tile_size_degrees(&self) -> Option<f64> {
        self.tile_size.or(self.tile_size_km.map(|km| km / KM_PER_DEGREE))
    }

    fn batch_options(&self) -> BatchOptions {
        let defaults = BatchOptions::default();
        BatchOptions {
            source_dir: self.source.clone(),
            destination_dir: self.destination.clone(),
            tile_size_degrees: self.tile_size_degrees().unwrap_or(defaults.tile_size_degrees),
            workers: self.workers.unwrap_or(defaults.workers),
            extensions: if self.extensions.is_empty() {
                defaults.extensions
            } else {
                self.extensions.clone()
            },
            edge_policy: self.edge_tiles,
            tile_format: self.format,
            checkpoint_every: self.checkpoint_every,
            use_checkpoint: !self.ignore_checkpoint,
        }
    }
}

fn progress_bar(multi: &MultiProgress, prefix: &'static str) -> Result<ProgressBar> {
    let style = ProgressStyle::with_template("{prefix:>5} [{elapsed_precise}] {wide_bar} {percent:>3}%")?;
    Ok(multi.add(ProgressBar::new(PROGRESS_STEPS).with_style(style).with_prefix(prefix)))
}

/// Mirrors the progress on `bar`, the run is cancelled once `interrupted` is set.
fn abortable_progress(bar: ProgressBar, interrupted: Arc<AtomicBool>) -> impl ProgressNotification {
    CallbackProgress::<(), _>::with_cb(move |pos, _| {
        bar.set_position((pos * PROGRESS_STEPS as f64) as u64);
        if interrupted.load(Ordering::SeqCst) {
            ComputationStatus::Abort
        } else {
            ComputationStatus::Continue
        }
    })
}

fn log_report(report: &BatchReport) {
    log::info!(
        "Files: {} processed, {} failed, {} skipped by checkpoint of {} total",
        report.files_processed,
        report.files_failed,
        report.files_skipped,
        report.total_files
    );
    log::info!(
        "Tiles: {} written, {} already present, {} failed",
        report.tiles_written,
        report.tiles_existing,
        report.tiles_failed
    );

    for id in report.failed_tiles.iter().take(MAX_REPORTED_FAILURES) {
        log::warn!("Failed tile: {id}");
    }

    if report.failed_tiles.len() > MAX_REPORTED_FAILURES {
        log::warn!("... and {} more failed tiles", report.failed_tiles.len() - MAX_REPORTED_FAILURES);
    }

    if !report.completed {
        log::warn!("Tiling was interrupted, run again to resume from the checkpoint");
    }
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    let logger = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .build();

    let multi = MultiProgress::new();
    if opt.no_progress {
        multi.set_draw_target(ProgressDrawTarget::hidden());
    }

    let level = logger.filter();
    LogWrapper::new(multi.clone(), logger).try_init()?;
    log::set_max_level(level);

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || {
            log::warn!("Interrupt received, finishing the tiles in progress");
            interrupted.store(true, Ordering::SeqCst);
        })?;
    }

    let processor = BatchProcessor::new(opt.batch_options(), FormatRasterSource, CheckpointStore::new(&opt.checkpoint))?;

    let file_bar = progress_bar(&multi, "Files")?;
    let tile_bar = progress_bar(&multi, "Tiles")?;

    let file_progress = abortable_progress(file_bar.clone(), interrupted.clone());
    let tile_progress = abortable_progress(tile_bar.clone(), interrupted);

    let report = processor.run(&file_progress, &tile_progress)?;
    tile_bar.finish_and_clear();
    file_bar.finish_and_clear();

    log_report(&report);
    Ok(())
}
