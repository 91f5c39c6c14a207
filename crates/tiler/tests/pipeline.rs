//! End to end tests of the batch processor on in memory rasters and on real files.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use geo::{Columns, DenseArray, FormatRasterSource, GeoRaster, GeoTransform, RasterSize, RasterSource, Rows};
use inf::progressinfo::{CallbackProgress, ComputationStatus, DummyProgress, ProgressNotification};
use tiler::{
    BatchOptions, BatchProcessor, BatchState, Checkpoint, CheckpointStore, EdgeTilePolicy, Error, TileFormat, TileGrid,
};

/// Serves rasters by file name, the files on disk only exist to be discovered
#[derive(Default)]
struct MemorySource {
    rasters: HashMap<String, GeoRaster>,
    opened: Mutex<Vec<String>>,
}

impl MemorySource {
    fn with_raster(mut self, name: &str, raster: GeoRaster) -> Self {
        self.rasters.insert(name.to_string(), raster);
        self
    }

    fn opened(&self) -> Vec<String> {
        self.opened.lock().expect("poisoned").clone()
    }
}

impl RasterSource for MemorySource {
    fn open(&self, path: &Path) -> geo::Result<GeoRaster> {
        let name = path.file_name().expect("file name").to_string_lossy().to_string();
        self.opened.lock().expect("poisoned").push(name.clone());
        self.rasters
            .get(&name)
            .cloned()
            .ok_or_else(|| geo::Error::Runtime(format!("Corrupt raster {name}")))
    }
}

impl RasterSource for &MemorySource {
    fn open(&self, path: &Path) -> geo::Result<GeoRaster> {
        (**self).open(path)
    }
}

/// Progress that requests cancellation on the given tick
struct AbortOnTick {
    ticks: AtomicUsize,
    abort_at: usize,
}

impl AbortOnTick {
    fn new(abort_at: usize) -> Self {
        AbortOnTick {
            ticks: AtomicUsize::new(0),
            abort_at,
        }
    }
}

impl ProgressNotification for AbortOnTick {
    fn reset(&self, _total: u64) {}

    fn set_position(&self, _position: u64) -> inf::Result {
        Ok(())
    }

    fn tick(&self) -> inf::Result {
        if self.ticks.fetch_add(1, Ordering::SeqCst) + 1 >= self.abort_at {
            return Err(inf::Error::Cancelled);
        }

        Ok(())
    }
}

struct Workspace {
    _tmp: tempfile::TempDir,
    source_dir: PathBuf,
    destination_dir: PathBuf,
    checkpoint: PathBuf,
}

impl Workspace {
    fn new(source_files: &[&str]) -> Workspace {
        let tmp = tempfile::tempdir().expect("temp dir");
        let source_dir = tmp.path().join("source");
        std::fs::create_dir_all(&source_dir).expect("source dir");
        for name in source_files {
            std::fs::write(source_dir.join(name), [0u8]).expect("source file");
        }

        Workspace {
            source_dir,
            destination_dir: tmp.path().join("tiles"),
            checkpoint: tmp.path().join("checkpoint.json"),
            _tmp: tmp,
        }
    }

    fn options(&self) -> BatchOptions {
        BatchOptions {
            source_dir: self.source_dir.clone(),
            destination_dir: self.destination_dir.clone(),
            workers: 1,
            ..Default::default()
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        CheckpointStore::new(&self.checkpoint).load().expect("checkpoint")
    }

    fn processor<S: RasterSource>(&self, options: BatchOptions, source: S) -> BatchProcessor<S> {
        BatchProcessor::new(options, source, CheckpointStore::new(&self.checkpoint)).expect("valid options")
    }

    fn tiles(&self) -> BTreeMap<String, Vec<u8>> {
        let mut tiles = BTreeMap::new();
        if let Ok(entries) = std::fs::read_dir(&self.destination_dir) {
            for entry in entries {
                let path = entry.expect("dir entry").path();
                let name = path.file_name().expect("file name").to_string_lossy().to_string();
                tiles.insert(name, std::fs::read(&path).expect("tile contents"));
            }
        }

        tiles
    }
}

/// Raster in degrees with a unique value for every cell
fn synthetic_raster(top_left: (f64, f64), size: RasterSize, cell_size: f64) -> GeoRaster {
    let data = (0..size.cell_count()).map(|i| (i % 60000) as f32).collect();
    GeoRaster::new(
        GeoTransform::from_top_left_and_cell_size(top_left.0, top_left.1, cell_size, -cell_size),
        DenseArray::new(size, data).expect("valid raster"),
        Some(-9999.0),
        1,
    )
}

fn example_raster() -> GeoRaster {
    synthetic_raster((-120.0, 40.0), RasterSize::square(100), 0.01)
}

fn two_file_source() -> MemorySource {
    MemorySource::default()
        .with_raster("a.bil", example_raster())
        .with_raster("b.bil", synthetic_raster((-121.0, 40.0), RasterSize::square(100), 0.01))
}

#[test_log::test]
fn example_raster_produces_hundred_tiles() -> tiler::Result {
    let ws = Workspace::new(&["n40w120.bil"]);
    let source = MemorySource::default().with_raster("n40w120.bil", example_raster());
    let processor = ws.processor(ws.options(), source);

    let report = processor.run(&DummyProgress, &DummyProgress)?;
    assert!(report.completed);
    assert_eq!(report.total_files, 1);
    assert_eq!(report.files_processed, 1);
    assert_eq!(report.tiles_written, 100);
    assert_eq!(processor.state(), BatchState::Complete);
    assert_eq!(ws.checkpoint(), Checkpoint::new(1, 0));

    let tiles = ws.tiles();
    assert_eq!(tiles.len(), 200);
    assert!(tiles.contains_key("39.950000_-119.950000.png"));
    assert!(tiles.contains_key("39.950000_-119.950000.pgw"));
    assert!(tiles.contains_key("39.050000_-119.050000.png"));
    Ok(())
}

#[test_log::test]
fn rerun_does_not_touch_existing_tiles() -> tiler::Result {
    let ws = Workspace::new(&["a.bil", "b.bil"]);
    let options = BatchOptions {
        workers: 4,
        ..ws.options()
    };

    ws.processor(options.clone(), two_file_source()).run(&DummyProgress, &DummyProgress)?;
    let first_run = ws.tiles();
    assert_eq!(first_run.len(), 400);

    let report = ws
        .processor(
            BatchOptions {
                use_checkpoint: false,
                ..options
            },
            two_file_source(),
        )
        .run(&DummyProgress, &DummyProgress)?;

    assert_eq!(report.tiles_written, 0);
    assert_eq!(report.tiles_existing, 200);
    assert_eq!(ws.tiles(), first_run);
    Ok(())
}

#[test_log::test]
fn completed_checkpoint_skips_everything() -> tiler::Result {
    let ws = Workspace::new(&["a.bil", "b.bil"]);
    ws.processor(ws.options(), two_file_source()).run(&DummyProgress, &DummyProgress)?;

    let source = two_file_source();
    let report = ws.processor(ws.options(), &source).run(&DummyProgress, &DummyProgress)?;
    assert!(report.completed);
    assert_eq!(report.files_skipped, 2);
    assert_eq!(report.tiles_written + report.tiles_existing, 0);
    assert!(source.opened().is_empty());
    Ok(())
}

#[test_log::test]
fn resume_after_interrupt_matches_uninterrupted_run() -> tiler::Result {
    let reference = Workspace::new(&["a.bil", "b.bil"]);
    reference
        .processor(reference.options(), two_file_source())
        .run(&DummyProgress, &DummyProgress)?;

    let ws = Workspace::new(&["a.bil", "b.bil"]);
    let interrupted = ws.processor(ws.options(), two_file_source());
    let report = interrupted.run(&DummyProgress, &AbortOnTick::new(130))?;
    assert!(!report.completed);
    assert_eq!(report.tiles_written, 130);
    assert_eq!(interrupted.state(), BatchState::Interrupted);
    assert_eq!(ws.checkpoint(), Checkpoint::new(1, 30));

    let source = two_file_source();
    let report = ws.processor(ws.options(), &source).run(&DummyProgress, &DummyProgress)?;
    assert!(report.completed);
    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.tiles_written, 70);
    assert_eq!(report.tiles_existing, 0);
    assert_eq!(source.opened(), vec!["b.bil".to_string()]);

    assert_eq!(ws.tiles(), reference.tiles());
    Ok(())
}

#[test_log::test]
fn lost_checkpoint_falls_back_to_existing_tiles() -> tiler::Result {
    let ws = Workspace::new(&["a.bil", "b.bil"]);
    ws.processor(ws.options(), two_file_source())
        .run(&DummyProgress, &AbortOnTick::new(130))?;
    std::fs::remove_file(&ws.checkpoint)?;

    let report = ws.processor(ws.options(), two_file_source()).run(&DummyProgress, &DummyProgress)?;
    assert!(report.completed);
    assert_eq!(report.tiles_existing, 130);
    assert_eq!(report.tiles_written, 70);
    assert_eq!(ws.tiles().len(), 400);
    Ok(())
}

#[test_log::test]
fn cancel_through_callback_progress() -> tiler::Result {
    let ws = Workspace::new(&["a.bil", "b.bil"]);
    let files_done = CallbackProgress::<(), _>::with_cb(|fraction, _| {
        if fraction >= 0.5 {
            ComputationStatus::Abort
        } else {
            ComputationStatus::Continue
        }
    });

    let report = ws.processor(ws.options(), two_file_source()).run(&files_done, &DummyProgress)?;
    assert!(!report.completed);
    assert_eq!(report.files_processed, 1);
    assert_eq!(ws.checkpoint(), Checkpoint::new(1, 0));
    assert_eq!(ws.tiles().len(), 200);
    Ok(())
}

/// Reads the checkpoint from disk on every tick
struct CheckpointObserver<'a> {
    path: &'a Path,
    seen: Mutex<Vec<Checkpoint>>,
}

impl ProgressNotification for CheckpointObserver<'_> {
    fn reset(&self, _total: u64) {}

    fn set_position(&self, _position: u64) -> inf::Result {
        Ok(())
    }

    fn tick(&self) -> inf::Result {
        let checkpoint = CheckpointStore::new(self.path).load().unwrap_or_default();
        self.seen.lock().expect("poisoned").push(checkpoint);
        Ok(())
    }
}

#[test]
fn intra_file_checkpoints_follow_completed_tiles() -> tiler::Result {
    let ws = Workspace::new(&["a.bil"]);
    let options = BatchOptions {
        checkpoint_every: Some(10),
        ..ws.options()
    };

    let observer = CheckpointObserver {
        path: &ws.checkpoint,
        seen: Mutex::new(Vec::new()),
    };
    let source = MemorySource::default().with_raster("a.bil", example_raster());
    ws.processor(options, source).run(&DummyProgress, &observer)?;

    let seen = observer.seen.into_inner().expect("poisoned");
    assert_eq!(seen.len(), 100);
    assert_eq!(seen[8], Checkpoint::new(0, 0));
    assert_eq!(seen[9], Checkpoint::new(0, 10));
    assert_eq!(seen[24], Checkpoint::new(0, 20));
    assert_eq!(ws.checkpoint(), Checkpoint::new(1, 0));
    Ok(())
}

#[test_log::test]
fn unreadable_and_degenerate_files_are_skipped() -> tiler::Result {
    let ws = Workspace::new(&["a.bil", "b_corrupt.bil", "c_coarse.bil", "d.bil"]);
    let source = MemorySource::default()
        .with_raster("a.bil", example_raster())
        .with_raster("c_coarse.bil", synthetic_raster((0.0, 0.0), RasterSize::square(10), 0.5))
        .with_raster("d.bil", synthetic_raster((10.0, 10.0), RasterSize::square(10), 0.01));

    let report = ws.processor(ws.options(), source).run(&DummyProgress, &DummyProgress)?;
    assert!(report.completed);
    assert_eq!(report.files_processed, 2);
    assert_eq!(report.files_failed, 2);
    assert_eq!(report.tiles_written, 101);
    assert_eq!(ws.checkpoint(), Checkpoint::new(4, 0));
    Ok(())
}

#[test]
fn nodata_tile_is_written_as_zeros() -> tiler::Result {
    let ws = Workspace::new(&["void.bil"]);
    let raster = GeoRaster::new(
        GeoTransform::from_top_left_and_cell_size(-120.0, 40.0, 0.01, -0.01),
        DenseArray::filled_with(-9999.0, RasterSize::square(10)),
        Some(-9999.0),
        1,
    );

    let source = MemorySource::default().with_raster("void.bil", raster);
    ws.processor(ws.options(), source).run(&DummyProgress, &DummyProgress)?;

    let image = geo::pngio::read_png_u16(&ws.destination_dir.join("39.950000_-119.950000.png"))?;
    assert_eq!(image.size(), RasterSize::square(10));
    assert!(image.as_slice().iter().all(|&v| v == 0));
    Ok(())
}

#[test]
fn edge_policy_determines_tile_count() -> tiler::Result {
    let size = RasterSize::with_rows_cols(Rows(95), Columns(107));

    for (policy, expected_tiles) in [(EdgeTilePolicy::Drop, 10 * 9), (EdgeTilePolicy::Pad, 11 * 10)] {
        let ws = Workspace::new(&["edge.bil"]);
        let source = MemorySource::default().with_raster("edge.bil", synthetic_raster((-120.0, 40.0), size, 0.01));
        let options = BatchOptions {
            edge_policy: policy,
            ..ws.options()
        };

        let report = ws.processor(options, source).run(&DummyProgress, &DummyProgress)?;
        assert_eq!(report.tiles_written, expected_tiles, "{policy:?}");
    }

    Ok(())
}

#[test]
fn stale_temporaries_are_removed() -> tiler::Result {
    let ws = Workspace::new(&["a.bil"]);
    std::fs::create_dir_all(&ws.destination_dir)?;
    std::fs::write(ws.destination_dir.join("39.950000_-119.950000.png.tmp"), [1u8, 2, 3])?;

    let source = MemorySource::default().with_raster("a.bil", example_raster());
    ws.processor(ws.options(), source).run(&DummyProgress, &DummyProgress)?;

    assert!(ws.tiles().keys().all(|name| !name.ends_with(".tmp")));
    assert_eq!(ws.tiles().len(), 200);
    Ok(())
}

#[test]
fn checkpoint_beyond_file_list_completes_immediately() -> tiler::Result {
    let ws = Workspace::new(&["a.bil"]);
    std::fs::write(&ws.checkpoint, r#"{"current_file": 5, "current_square": 3}"#)?;

    let source = MemorySource::default().with_raster("a.bil", example_raster());
    let processor = ws.processor(ws.options(), &source);
    let report = processor.run(&DummyProgress, &DummyProgress)?;

    assert!(report.completed);
    assert_eq!(processor.state(), BatchState::Complete);
    assert!(source.opened().is_empty());
    assert!(ws.tiles().is_empty());
    Ok(())
}

#[test]
fn legacy_checkpoint_resumes_inside_file() -> tiler::Result {
    let ws = Workspace::new(&["a.bil"]);
    std::fs::write(&ws.checkpoint, r#"{"current_file": 0, "current_tile": 90}"#)?;

    let source = MemorySource::default().with_raster("a.bil", example_raster());
    let report = ws.processor(ws.options(), source).run(&DummyProgress, &DummyProgress)?;
    assert_eq!(report.tiles_written, 10);
    assert!(ws.tiles().contains_key("39.050000_-119.050000.png"));
    assert!(!ws.tiles().contains_key("39.950000_-119.950000.png"));
    Ok(())
}

#[test]
fn invalid_options_are_rejected() {
    let ws = Workspace::new(&[]);
    let invalid = [
        BatchOptions {
            source_dir: ws.source_dir.join("missing"),
            ..ws.options()
        },
        BatchOptions {
            tile_size_degrees: 0.0,
            ..ws.options()
        },
        BatchOptions {
            tile_size_degrees: f64::NAN,
            ..ws.options()
        },
        BatchOptions {
            workers: 0,
            ..ws.options()
        },
        BatchOptions {
            extensions: Vec::new(),
            ..ws.options()
        },
    ];

    for options in invalid {
        let res = BatchProcessor::new(options, MemorySource::default(), CheckpointStore::new(&ws.checkpoint));
        assert!(matches!(res, Err(Error::InvalidConfiguration(_))));
    }
}

#[test_log::test]
fn real_bil_and_geotiff_sources() -> tiler::Result {
    let ws = Workspace::new(&[]);

    // 20 x 20 pixels of 0.01 degrees, the header stores the center of the top left pixel
    let header = "BYTEORDER I\nLAYOUT BIL\nNROWS 20\nNCOLS 20\nNBANDS 1\nNBITS 16\nPIXELTYPE SIGNEDINT\n\
                  ULXMAP -119.995\nULYMAP 40.995\nXDIM 0.01\nYDIM 0.01\nNODATA -9999\n";
    let nested = ws.source_dir.join("n40w120");
    std::fs::create_dir_all(&nested)?;
    std::fs::write(nested.join("n40w120.hdr"), header)?;
    let samples: Vec<u8> = (0..400i16)
        .map(|i| if i == 0 { -9999 } else { i - 50 })
        .flat_map(|v| v.to_le_bytes())
        .collect();
    std::fs::write(nested.join("n40w120.bil"), samples)?;

    let tif_data = DenseArray::new(RasterSize::square(10), (0..100u16).collect())?;
    geo::geotiff::write_geotiff_u16(
        &ws.source_dir.join("s01e010.tif"),
        &GeoTransform::from_top_left_and_cell_size(10.0, -1.0, 0.01, -0.01),
        &tif_data,
    )?;

    let options = BatchOptions {
        tile_format: TileFormat::GeoTiff,
        ..ws.options()
    };
    let report = ws.processor(options, FormatRasterSource).run(&DummyProgress, &DummyProgress)?;
    assert!(report.completed);
    assert_eq!(report.total_files, 2);
    assert_eq!(report.tiles_written, 5);

    let tiles = ws.tiles();
    assert!(tiles.contains_key("40.950000_-119.950000.tif"));
    assert!(tiles.contains_key("40.950000_-119.950000.tfw"));
    assert!(tiles.contains_key("40.850000_-119.850000.tif"));
    assert!(tiles.contains_key("-1.050000_10.050000.tif"));

    let first = geo::geotiff::read_geotiff(&ws.destination_dir.join("40.950000_-119.950000.tif"))?;
    let (band, _) = first.band(1)?;
    // nodata and negative elevations become 0
    assert_eq!(band.as_slice()[0], 0.0);
    assert_eq!(band.as_slice()[1], 0.0);
    assert_eq!(band.as_slice()[51], 51.0);
    approx::assert_relative_eq!(first.geo_transform().top_left_x(), -120.0, epsilon = 1e-9);
    approx::assert_relative_eq!(first.geo_transform().top_left_y(), 41.0, epsilon = 1e-9);
    Ok(())
}

#[test_log::test]
fn destination_inside_source_tree_is_not_a_source() -> tiler::Result {
    let ws = Workspace::new(&[]);
    geo::geotiff::write_geotiff_u16(
        &ws.source_dir.join("dem.tif"),
        &GeoTransform::from_top_left_and_cell_size(10.0, -1.0, 0.01, -0.01),
        &DenseArray::new(RasterSize::square(20), (0..400u16).collect())?,
    )?;

    // the same directory spelled differently than the source directory
    std::fs::create_dir_all(ws.source_dir.join("sub"))?;
    let destination_dir = ws.source_dir.join("sub").join("..").join("tiles");
    let options = BatchOptions {
        destination_dir: destination_dir.clone(),
        tile_format: TileFormat::GeoTiff,
        use_checkpoint: false,
        ..ws.options()
    };

    let first = ws.processor(options.clone(), FormatRasterSource).run(&DummyProgress, &DummyProgress)?;
    assert_eq!(first.total_files, 1);
    assert_eq!(first.tiles_written, 4);
    assert!(destination_dir.join("-1.050000_10.050000.tif").is_file());

    let second = ws.processor(options, FormatRasterSource).run(&DummyProgress, &DummyProgress)?;
    assert_eq!(second.total_files, 1);
    assert_eq!(second.tiles_existing, 4);
    assert_eq!(second.tiles_written, 0);
    Ok(())
}

#[test_log::test]
fn interrupted_parallel_run_resumes_to_complete_tile_set() -> tiler::Result {
    let reference = Workspace::new(&["a.bil"]);
    let source = || MemorySource::default().with_raster("a.bil", example_raster());
    reference
        .processor(reference.options(), source())
        .run(&DummyProgress, &DummyProgress)?;

    let ws = Workspace::new(&["a.bil"]);
    let options = BatchOptions {
        workers: 4,
        checkpoint_every: Some(5),
        ..ws.options()
    };

    let report = ws.processor(options.clone(), source()).run(&DummyProgress, &AbortOnTick::new(37))?;
    assert!(!report.completed);

    let checkpoint = ws.checkpoint();
    assert_eq!(checkpoint.current_file_index, 0);
    assert!(checkpoint.current_tile_index <= report.tiles_written);

    // every tile before the checkpoint is on disk, tiles in flight may have finished beyond it
    let raster = example_raster();
    let grid = TileGrid::new(raster.geo_transform(), raster.raster_size(), 0.1, EdgeTilePolicy::Drop)?;
    let tiles = ws.tiles();
    for position in grid.iter().take(checkpoint.current_tile_index) {
        let id = grid.tile_spec(position).identifier();
        assert!(tiles.contains_key(&format!("{id}.png")), "tile {} missing", position.index);
        assert!(tiles.contains_key(&format!("{id}.pgw")), "world file {} missing", position.index);
    }

    let resumed = ws.processor(options, source()).run(&DummyProgress, &DummyProgress)?;
    assert!(resumed.completed);
    assert_eq!(
        resumed.tiles_written + resumed.tiles_existing,
        100 - checkpoint.current_tile_index
    );
    assert_eq!(report.tiles_written + resumed.tiles_written, 100);
    assert_eq!(ws.tiles(), reference.tiles());
    Ok(())
}
