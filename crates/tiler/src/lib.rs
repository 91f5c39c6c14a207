#![warn(clippy::unwrap_used)]

//! Decomposition of large georeferenced rasters in tiles of a fixed size in degrees.
//! Every tile is written as an image with a world file, batches can be interrupted and resumed.

mod batch;
mod checkpoint;
mod completion;
mod error;
pub mod sourcefiles;
mod tileformat;
mod tilegrid;
mod tilespec;
mod tilewriter;

pub use batch::{BatchOptions, BatchProcessor, BatchReport, BatchState};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use completion::TileCompletion;
pub use error::Error;
pub use tileformat::TileFormat;
pub use tilegrid::{EdgeTilePolicy, TileGrid, TilePosition};
pub use tilespec::TileSpec;
pub use tilewriter::{TileWriteOutcome, TileWriter, to_u16_samples};

pub type Result<T = ()> = std::result::Result<T, Error>;
