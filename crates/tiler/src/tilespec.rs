use geo::{Cell, GeoTransform, RasterSize};

use crate::TilePosition;

/// Geographic identity of one planned tile.
/// All coordinates are derived from the source pixel size, also for padded edge tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSpec {
    pub index: usize,
    pub pixel_origin: Cell,
    pub pixel_extent: RasterSize,
    pub min_lon: f64,
    pub max_lat: f64,
    pub center_lon: f64,
    pub center_lat: f64,
    /// Transform of the tile image, the top left corner of the tile is its origin
    pub geo_transform: GeoTransform,
}

impl TileSpec {
    pub fn new(source_transform: &GeoTransform, position: TilePosition, pixel_extent: RasterSize) -> TileSpec {
        let pixel_width = source_transform.cell_size_x();
        let pixel_height = source_transform.cell_size_y();

        let min_lon = source_transform.top_left_x() + position.origin.col as f64 * pixel_width;
        let max_lat = source_transform.top_left_y() + position.origin.row as f64 * pixel_height;
        let center_lon = min_lon + pixel_extent.cols.count() as f64 * pixel_width / 2.0;
        let center_lat = max_lat + pixel_extent.rows.count() as f64 * pixel_height / 2.0;

        TileSpec {
            index: position.index,
            pixel_origin: position.origin,
            pixel_extent,
            min_lon,
            max_lat,
            center_lon,
            center_lat,
            geo_transform: GeoTransform::from_top_left_and_cell_size(min_lon, max_lat, pixel_width, pixel_height),
        }
    }

    /// The name of the tile on disk, without extension
    pub fn identifier(&self) -> String {
        format!("{:.6}_{:.6}", self.center_lat, self.center_lon)
    }

    pub fn max_lon(&self) -> f64 {
        self.min_lon + self.pixel_extent.cols.count() as f64 * self.geo_transform.cell_size_x()
    }

    pub fn min_lat(&self) -> f64 {
        self.max_lat + self.pixel_extent.rows.count() as f64 * self.geo_transform.cell_size_y()
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let (lon_low, lon_high) = min_max(self.min_lon, self.max_lon());
        let (lat_low, lat_high) = min_max(self.min_lat(), self.max_lat);
        (lon_low..=lon_high).contains(&lon) && (lat_low..=lat_high).contains(&lat)
    }
}

fn min_max(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}
