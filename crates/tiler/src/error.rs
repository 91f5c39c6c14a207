use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to open raster '{}': {source}", path.display())]
    UnreadableRaster {
        path: PathBuf,
        #[source]
        source: geo::Error,
    },
    #[error(
        "Tile size of {tile_size_degrees} degrees is smaller than a pixel (pixel size {pixel_width} x {pixel_height})"
    )]
    DegenerateTileSize {
        pixel_width: f64,
        pixel_height: f64,
        tile_size_degrees: f64,
    },
    #[error("Rasters with rotation terms in their geo transform are not supported")]
    RotatedTransform,
    #[error("Failed to write tile {identifier}: {source}")]
    TileWriteFailed {
        identifier: String,
        #[source]
        source: geo::Error,
    },
    #[error("Checkpoint error ({}): {reason}", path.display())]
    CheckpointIOError { path: PathBuf, reason: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Operation was cancelled")]
    Cancelled,
    #[error("{0}")]
    Geo(#[from] geo::Error),
    #[error("{0}")]
    Inf(#[from] inf::Error),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}
