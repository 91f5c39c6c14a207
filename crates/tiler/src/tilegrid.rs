use geo::{Cell, GeoTransform, RasterSize};
use strum::EnumString;

use crate::{Error, Result, TileSpec};

/// Quotients within this relative distance of an integer are rounded to it instead of floored
const PIXEL_COUNT_TOLERANCE: f64 = 1e-9;

/// What to do with the pixels at the right and bottom border that do not fill a complete tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString)]
#[strum(serialize_all = "kebab_case", ascii_case_insensitive)]
pub enum EdgeTilePolicy {
    /// Partial tiles are not produced, the remainder pixels are not covered by any tile
    #[default]
    Drop,
    /// Partial tiles are produced with the full tile extent, pixels outside of the raster become 0
    Pad,
}

/// A tile in the enumeration order of a [`TileGrid`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePosition {
    /// Position in the enumeration order, the value that is stored in the checkpoint
    pub index: usize,
    /// Top left pixel of the tile in the source raster
    pub origin: Cell,
}

/// Partitioning of a raster in tiles of a fixed size in degrees.
///
/// Tiles are enumerated column major: the outer loop walks the pixel columns in steps of one tile width,
/// the inner loop walks the rows in steps of one tile height.
/// The order only depends on the raster geometry and the tile size, a resumed run enumerates identically.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    geo_transform: GeoTransform,
    raster_size: RasterSize,
    pixels_per_tile_x: usize,
    pixels_per_tile_y: usize,
    tiles_x: usize,
    tiles_y: usize,
}

fn pixels_per_tile(tile_size_degrees: f64, pixel_size: f64) -> usize {
    let quotient = tile_size_degrees / pixel_size.abs();
    if !quotient.is_finite() || quotient <= 0.0 {
        return 0;
    }

    let nearest = quotient.round();
    if (quotient - nearest).abs() <= PIXEL_COUNT_TOLERANCE * nearest.max(1.0) {
        nearest as usize
    } else {
        quotient.floor() as usize
    }
}

impl TileGrid {
    pub fn new(
        geo_transform: GeoTransform,
        raster_size: RasterSize,
        tile_size_degrees: f64,
        edge_policy: EdgeTilePolicy,
    ) -> Result<TileGrid> {
        if geo_transform.has_rotation() {
            return Err(Error::RotatedTransform);
        }

        let pixels_per_tile_x = pixels_per_tile(tile_size_degrees, geo_transform.cell_size_x());
        let pixels_per_tile_y = pixels_per_tile(tile_size_degrees, geo_transform.cell_size_y());
        if pixels_per_tile_x == 0 || pixels_per_tile_y == 0 {
            return Err(Error::DegenerateTileSize {
                pixel_width: geo_transform.cell_size_x(),
                pixel_height: geo_transform.cell_size_y(),
                tile_size_degrees,
            });
        }

        let cols = raster_size.cols.count();
        let rows = raster_size.rows.count();
        let (tiles_x, tiles_y) = match edge_policy {
            EdgeTilePolicy::Drop => (cols / pixels_per_tile_x, rows / pixels_per_tile_y),
            EdgeTilePolicy::Pad => (cols.div_ceil(pixels_per_tile_x), rows.div_ceil(pixels_per_tile_y)),
        };

        Ok(TileGrid {
            geo_transform,
            raster_size,
            pixels_per_tile_x,
            pixels_per_tile_y,
            tiles_x,
            tiles_y,
        })
    }

    pub fn pixels_per_tile_x(&self) -> usize {
        self.pixels_per_tile_x
    }

    pub fn pixels_per_tile_y(&self) -> usize {
        self.pixels_per_tile_y
    }

    /// The pixel extent of every tile, also of the padded edge tiles
    pub fn tile_pixel_size(&self) -> RasterSize {
        RasterSize::with_rows_cols(geo::Rows(self.pixels_per_tile_y), geo::Columns(self.pixels_per_tile_x))
    }

    pub fn raster_size(&self) -> RasterSize {
        self.raster_size
    }

    pub fn tile_count(&self) -> usize {
        self.tiles_x * self.tiles_y
    }

    pub fn position(&self, index: usize) -> Option<TilePosition> {
        if index >= self.tile_count() {
            return None;
        }

        let (tile_col, tile_row) = (index / self.tiles_y, index % self.tiles_y);
        Some(TilePosition {
            index,
            origin: Cell::from_row_col(tile_row * self.pixels_per_tile_y, tile_col * self.pixels_per_tile_x),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = TilePosition> + '_ {
        self.iter_from(0)
    }

    /// Enumerates the tiles starting at position `start`, skipped tiles are not computed
    pub fn iter_from(&self, start: usize) -> impl Iterator<Item = TilePosition> + '_ {
        (start..self.tile_count()).filter_map(|index| self.position(index))
    }

    pub fn tile_spec(&self, position: TilePosition) -> TileSpec {
        TileSpec::new(&self.geo_transform, position, self.tile_pixel_size())
    }
}
