#![warn(clippy::unwrap_used)]

pub type Result<T = ()> = std::result::Result<T, Error>;

pub mod bil;
mod cell;
mod densearray;
mod error;
mod georaster;
pub mod geotiff;
mod geotransform;
pub mod pngio;
mod rastersize;
pub mod worldfile;

#[doc(inline)]
pub use cell::Cell;
#[doc(inline)]
pub use densearray::DenseArray;
#[doc(inline)]
pub use error::Error;
#[doc(inline)]
pub use georaster::{FormatRasterSource, GeoRaster, RasterFormat, RasterSource};
#[doc(inline)]
pub use geotransform::GeoTransform;
#[doc(inline)]
pub use rastersize::{Columns, RasterSize, Rows};
