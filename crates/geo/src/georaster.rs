use std::path::Path;

use crate::{DenseArray, Error, GeoTransform, RasterSize, Result, bil, geotiff};

/// A source raster materialized in memory.
/// Only the first band is loaded, `band_count` reports how many bands the file contains.
#[derive(Debug, Clone)]
pub struct GeoRaster {
    geo_transform: GeoTransform,
    band: DenseArray<f32>,
    nodata: Option<f64>,
    band_count: usize,
}

impl GeoRaster {
    pub fn new(geo_transform: GeoTransform, band: DenseArray<f32>, nodata: Option<f64>, band_count: usize) -> Self {
        GeoRaster {
            geo_transform,
            band,
            nodata,
            band_count,
        }
    }

    pub fn geo_transform(&self) -> GeoTransform {
        self.geo_transform
    }

    pub fn raster_size(&self) -> RasterSize {
        self.band.size()
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    /// Access a band with its nodata value, `index` is 1 based.
    pub fn band(&self, index: usize) -> Result<(&DenseArray<f32>, Option<f64>)> {
        if index != 1 {
            return Err(Error::InvalidArgument(format!(
                "Only the first band is loaded, requested band {index} of {}",
                self.band_count
            )));
        }

        Ok((&self.band, self.nodata))
    }
}

/// Opens source rasters.
/// Implementations are shared with the worker threads and must be `Sync`.
pub trait RasterSource: Sync {
    fn open(&self, path: &Path) -> Result<GeoRaster>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    GeoTiff,
    Bil,
}

impl RasterFormat {
    pub fn from_path(path: &Path) -> Option<RasterFormat> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "tif" | "tiff" => Some(RasterFormat::GeoTiff),
            "bil" => Some(RasterFormat::Bil),
            _ => None,
        }
    }
}

/// Selects the reader based on the file extension
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatRasterSource;

impl RasterSource for FormatRasterSource {
    fn open(&self, path: &Path) -> Result<GeoRaster> {
        match RasterFormat::from_path(path) {
            Some(RasterFormat::GeoTiff) => geotiff::read_geotiff(path),
            Some(RasterFormat::Bil) => bil::read_bil(path),
            None => Err(Error::UnsupportedFormat(path.to_string_lossy().to_string())),
        }
    }
}
