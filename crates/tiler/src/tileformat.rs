use core::fmt;

use geo::{DenseArray, GeoTransform};
use strum::EnumString;

/// Image format of the produced tiles, every format is accompanied by a world file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, serde::Serialize, serde::Deserialize)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    #[default]
    #[strum(serialize = "png")]
    Png,
    #[strum(serialize = "tif", serialize = "tiff", serialize = "geotiff")]
    GeoTiff,
}

impl TileFormat {
    pub fn extension(&self) -> &str {
        match self {
            TileFormat::Png => "png",
            TileFormat::GeoTiff => "tif",
        }
    }

    pub fn world_file_extension(&self) -> String {
        geo::worldfile::world_file_extension(self.extension())
    }

    /// Encodes 16 bit samples, the transform is only stored in formats that support it
    pub fn encode(&self, geo_transform: &GeoTransform, data: &DenseArray<u16>) -> geo::Result<Vec<u8>> {
        match self {
            TileFormat::Png => geo::pngio::encode_png_u16(data),
            TileFormat::GeoTiff => geo::geotiff::encode_geotiff_u16(geo_transform, data),
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                TileFormat::Png => "png",
                TileFormat::GeoTiff => "geotiff",
            }
        )
    }
}
