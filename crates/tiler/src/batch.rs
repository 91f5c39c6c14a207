use std::{
    path::{Path, PathBuf},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use geo::RasterSource;
use inf::progressinfo::ProgressNotification;
use rayon::prelude::*;

use crate::{
    CheckpointStore, EdgeTilePolicy, Error, Result, TileCompletion, TileFormat, TileGrid, TilePosition, TileWriteOutcome,
    TileWriter, sourcefiles,
};

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub source_dir: PathBuf,
    pub destination_dir: PathBuf,
    pub tile_size_degrees: f64,
    pub workers: usize,
    /// Source file extensions without leading dot, compared case insensitive
    pub extensions: Vec<String>,
    pub edge_policy: EdgeTilePolicy,
    pub tile_format: TileFormat,
    /// Save the checkpoint every `n` completed tiles, `None` only saves at file boundaries
    pub checkpoint_every: Option<usize>,
    /// When false the stored checkpoint is ignored and only existing tiles are skipped
    pub use_checkpoint: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            source_dir: PathBuf::new(),
            destination_dir: PathBuf::new(),
            tile_size_degrees: 0.1,
            workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
            extensions: vec!["bil".into(), "tif".into(), "tiff".into()],
            edge_policy: EdgeTilePolicy::Drop,
            tile_format: TileFormat::Png,
            checkpoint_every: None,
            use_checkpoint: true,
        }
    }
}

impl BatchOptions {
    pub fn validate(&self) -> Result {
        if !self.source_dir.is_dir() {
            return Err(Error::InvalidConfiguration(format!(
                "Source directory does not exist: {}",
                self.source_dir.display()
            )));
        }

        if self.destination_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfiguration("No destination directory provided".into()));
        }

        if !self.tile_size_degrees.is_finite() || self.tile_size_degrees <= 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "Tile size must be a positive number of degrees, got {}",
                self.tile_size_degrees
            )));
        }

        if self.workers == 0 {
            return Err(Error::InvalidConfiguration("At least one worker is required".into()));
        }

        if self.extensions.is_empty() {
            return Err(Error::InvalidConfiguration("No source file extensions provided".into()));
        }

        if self.checkpoint_every == Some(0) {
            return Err(Error::InvalidConfiguration("Checkpoint interval must be at least one tile".into()));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    NotStarted,
    Resuming { file_index: usize, tile_index: usize },
    ProcessingFile(usize),
    AdvancingFile(usize),
    Interrupted,
    Complete,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub total_files: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    /// Files before the checkpoint that were not opened
    pub files_skipped: usize,
    pub tiles_written: usize,
    pub tiles_existing: usize,
    pub tiles_failed: usize,
    pub failed_tiles: Vec<String>,
    /// False when the run was cancelled before all files were processed
    pub completed: bool,
}

/// Counters shared by the workers of one run
#[derive(Default)]
struct TileCounters {
    written: AtomicUsize,
    existing: AtomicUsize,
    failed: AtomicUsize,
    failed_tiles: Mutex<Vec<String>>,
}

impl TileCounters {
    fn record(&self, identifier: String, res: Result<TileWriteOutcome>) {
        match res {
            Ok(TileWriteOutcome::Written) => {
                self.written.fetch_add(1, Ordering::Relaxed);
            }
            Ok(TileWriteOutcome::AlreadyPresent) => {
                log::info!("Skipping existing tile {identifier}");
                self.existing.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                log::error!("{e}");
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.failed_tiles
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(identifier);
            }
        }
    }

    fn add_to(self, report: &mut BatchReport) {
        report.tiles_written += self.written.into_inner();
        report.tiles_existing += self.existing.into_inner();
        report.tiles_failed += self.failed.into_inner();
        report
            .failed_tiles
            .extend(self.failed_tiles.into_inner().unwrap_or_else(PoisonError::into_inner));
    }
}

/// Decides when the completed tile count of a file is logged, roughly every tenth of the tiles
struct ProgressLog {
    step: usize,
    next: AtomicUsize,
}

impl ProgressLog {
    fn new(start_tile: usize, tile_count: usize) -> Self {
        let step = (tile_count / 10).max(1);
        ProgressLog {
            step,
            next: AtomicUsize::new(start_tile + step),
        }
    }

    /// True for exactly one caller once the watermark reaches the next reporting point
    fn is_due(&self, watermark: usize) -> bool {
        let due = self.next.load(Ordering::Acquire);
        watermark >= due
            && self
                .next
                .compare_exchange(due, watermark + self.step, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }
}

enum FileOutcome {
    Processed,
    Failed,
    Interrupted { tile_index: usize },
}

/// Drives the tiling of all source files.
///
/// Two resume mechanisms complement each other: the checkpoint skips files and tiles by index without any I/O,
/// the tile writer skips tiles that are already complete on disk.
pub struct BatchProcessor<S: RasterSource> {
    options: BatchOptions,
    source: S,
    checkpoint: CheckpointStore,
    state: Mutex<BatchState>,
}

impl<S: RasterSource> BatchProcessor<S> {
    pub fn new(options: BatchOptions, source: S, checkpoint: CheckpointStore) -> Result<Self> {
        options.validate()?;
        Ok(BatchProcessor {
            options,
            source,
            checkpoint,
            state: Mutex::new(BatchState::NotStarted),
        })
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    pub fn state(&self) -> BatchState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: BatchState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        log::debug!("Batch state {:?} -> {next:?}", *state);
        *state = next;
    }

    fn create_thread_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers)
            .thread_name(|i| format!("tile-writer-{i}"))
            .build()
            .map_err(|e| Error::InvalidConfiguration(format!("Failed to create threadpool: {e}")))
    }

    /// The destination directory must exist, files are compared to it in their canonical form
    fn source_files(&self) -> Result<Vec<PathBuf>> {
        let destination_dir = std::fs::canonicalize(&self.options.destination_dir).map_err(|e| {
            Error::InvalidConfiguration(format!(
                "Failed to resolve destination directory {} ({e})",
                self.options.destination_dir.display()
            ))
        })?;

        let mut files = sourcefiles::find_source_files(&self.options.source_dir, &self.options.extensions)?;
        // tiles written into the source tree are not source files
        files.retain(|f| !std::fs::canonicalize(f).is_ok_and(|f| f.starts_with(&destination_dir)));
        Ok(files)
    }

    fn prepare_destination(&self) -> Result {
        inf::fs::create_directory(&self.options.destination_dir)?;
        let removed = inf::fs::remove_stale_temporaries(&self.options.destination_dir)?;
        if removed > 0 {
            log::info!("Removed {removed} incomplete temporary files from a previous run");
        }

        Ok(())
    }

    /// Processes all source files.
    ///
    /// A failing tick of `file_progress` or `tile_progress` cancels the run: no new tiles are dispatched,
    /// the tiles in flight are finished and the checkpoint is saved at the last fully completed tile.
    /// Only checkpoint failures and an unusable destination abort the run with an error.
    pub fn run(&self, file_progress: &impl ProgressNotification, tile_progress: &impl ProgressNotification) -> Result<BatchReport> {
        self.prepare_destination()?;
        let files = self.source_files()?;
        let pool = self.create_thread_pool()?;
        let writer = TileWriter::new(&self.options.destination_dir, self.options.tile_format);

        let mut report = BatchReport {
            total_files: files.len(),
            ..Default::default()
        };

        let resume = if self.options.use_checkpoint {
            self.checkpoint.load()?
        } else {
            Default::default()
        };

        if resume.current_file_index > files.len() {
            log::warn!(
                "Checkpoint refers to file {} but only {} source files were found, nothing to do",
                resume.current_file_index,
                files.len()
            );
            report.files_skipped = files.len();
            report.completed = true;
            self.transition(BatchState::Complete);
            return Ok(report);
        }

        if resume.current_file_index > 0 || resume.current_tile_index > 0 {
            log::info!(
                "Resuming at file {} tile {}",
                resume.current_file_index + 1,
                resume.current_tile_index
            );
            self.transition(BatchState::Resuming {
                file_index: resume.current_file_index,
                tile_index: resume.current_tile_index,
            });
        }

        report.files_skipped = resume.current_file_index;
        file_progress.reset(files.len() as u64);
        let mut cancelled = file_progress.set_position(resume.current_file_index as u64).is_err();

        for (file_index, path) in files.iter().enumerate().skip(resume.current_file_index) {
            let start_tile = if file_index == resume.current_file_index {
                resume.current_tile_index
            } else {
                0
            };

            if cancelled {
                self.checkpoint.save(file_index, start_tile)?;
                report.completed = false;
                self.transition(BatchState::Interrupted);
                return Ok(report);
            }

            log::info!("Processing file {}/{}: {}", file_index + 1, files.len(), path.display());
            self.transition(BatchState::ProcessingFile(file_index));

            let counters = TileCounters::default();
            let outcome = self.process_file(&pool, &writer, file_index, path, start_tile, &counters, tile_progress);
            counters.add_to(&mut report);

            match outcome? {
                FileOutcome::Processed => report.files_processed += 1,
                FileOutcome::Failed => report.files_failed += 1,
                FileOutcome::Interrupted { tile_index } => {
                    log::info!("Interrupted at file {} tile {tile_index}", file_index + 1);
                    self.checkpoint.save(file_index, tile_index)?;
                    report.completed = false;
                    self.transition(BatchState::Interrupted);
                    return Ok(report);
                }
            }

            self.transition(BatchState::AdvancingFile(file_index));
            self.checkpoint.save(file_index + 1, 0)?;
            cancelled = file_progress.tick().is_err();
        }

        report.completed = true;
        self.transition(BatchState::Complete);
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn process_file(
        &self,
        pool: &rayon::ThreadPool,
        writer: &TileWriter,
        file_index: usize,
        path: &Path,
        start_tile: usize,
        counters: &TileCounters,
        tile_progress: &impl ProgressNotification,
    ) -> Result<FileOutcome> {
        let raster = match self.source.open(path) {
            Ok(raster) => raster,
            Err(source) => {
                log::error!(
                    "{}",
                    Error::UnreadableRaster {
                        path: path.to_path_buf(),
                        source
                    }
                );
                return Ok(FileOutcome::Failed);
            }
        };

        let (band, nodata) = match raster.band(1) {
            Ok(band) => band,
            Err(source) => {
                log::error!(
                    "{}",
                    Error::UnreadableRaster {
                        path: path.to_path_buf(),
                        source
                    }
                );
                return Ok(FileOutcome::Failed);
            }
        };

        let grid = match TileGrid::new(
            raster.geo_transform(),
            raster.raster_size(),
            self.options.tile_size_degrees,
            self.options.edge_policy,
        ) {
            Ok(grid) => grid,
            Err(e) => {
                log::error!("Failed to tile {}: {e}", path.display());
                return Ok(FileOutcome::Failed);
            }
        };

        let tile_count = grid.tile_count();
        log::debug!(
            "{}: {} tiles of {}x{} pixels",
            path.display(),
            tile_count,
            grid.pixels_per_tile_x(),
            grid.pixels_per_tile_y()
        );

        if start_tile > tile_count {
            log::warn!(
                "Checkpoint refers to tile {start_tile} but {} only contains {tile_count} tiles",
                path.display()
            );
        }

        tile_progress.reset(tile_count as u64);
        if tile_progress.set_position(start_tile.min(tile_count) as u64).is_err() {
            return Ok(FileOutcome::Interrupted { tile_index: start_tile });
        }

        // with a single worker the tiles are written in enumeration order
        let positions: Vec<TilePosition> = grid.iter_from(start_tile).collect();
        let completion = TileCompletion::starting_at(start_tile);
        let last_saved = AtomicUsize::new(start_tile);
        let cancelled = AtomicBool::new(false);
        let progress_log = ProgressLog::new(start_tile, tile_count);
        let checkpoint_error: Mutex<Option<Error>> = Mutex::new(None);

        pool.install(|| {
            positions.into_par_iter().for_each(|position| {
                if cancelled.load(Ordering::Acquire) {
                    return;
                }

                let spec = grid.tile_spec(position);
                counters.record(spec.identifier(), writer.write_tile(&spec, band, nodata));

                let watermark = completion.complete(position.index);
                if progress_log.is_due(watermark) {
                    log::info!("Tile {watermark}/{tile_count} of {}", path.display());
                }

                if let Err(e) = self.save_intra_file_checkpoint(file_index, watermark, &last_saved) {
                    checkpoint_error
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .get_or_insert(e);
                    cancelled.store(true, Ordering::Release);
                }

                if tile_progress.tick().is_err() {
                    cancelled.store(true, Ordering::Release);
                }
            });
        });

        if let Some(e) = checkpoint_error.into_inner().unwrap_or_else(PoisonError::into_inner) {
            return Err(e);
        }

        if cancelled.into_inner() {
            return Ok(FileOutcome::Interrupted {
                tile_index: completion.watermark(),
            });
        }

        Ok(FileOutcome::Processed)
    }

    fn save_intra_file_checkpoint(&self, file_index: usize, watermark: usize, last_saved: &AtomicUsize) -> Result {
        let Some(every) = self.options.checkpoint_every else {
            return Ok(());
        };

        if watermark >= last_saved.load(Ordering::Acquire) + every {
            last_saved.fetch_max(watermark, Ordering::AcqRel);
            self.checkpoint.advance(file_index, watermark)?;
        }

        Ok(())
    }
}
