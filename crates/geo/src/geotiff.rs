//! GeoTIFF reading and writing using the pure Rust tiff crate.

mod decoder;
mod reader;
mod writer;

pub use reader::read_geotiff;
pub use writer::{encode_geotiff_u16, write_geotiff_u16};
