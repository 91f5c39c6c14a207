use std::path::{Path, PathBuf};

use geo::DenseArray;
use inf::fs::StagedFile;

use crate::{Error, Result, TileFormat, TileSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileWriteOutcome {
    Written,
    AlreadyPresent,
}

/// Converts source samples to the 16 bit range of the tile images.
/// Nodata and NaN samples become 0, other values are clamped to [0, 65535] and truncated.
pub fn to_u16_samples(samples: &DenseArray<f32>, nodata: Option<f64>) -> DenseArray<u16> {
    let nodata = nodata.map(|nd| nd as f32);
    samples.map(|v| {
        if v.is_nan() || Some(v) == nodata {
            0
        } else {
            v.clamp(0.0, f32::from(u16::MAX)) as u16
        }
    })
}

/// Writes the image and world file pair of a tile.
/// A tile is complete when both files are present and non empty, complete tiles are never rewritten.
#[derive(Debug, Clone)]
pub struct TileWriter {
    destination: PathBuf,
    format: TileFormat,
}

impl TileWriter {
    pub fn new(destination: &Path, format: TileFormat) -> Self {
        TileWriter {
            destination: destination.to_path_buf(),
            format,
        }
    }

    pub fn image_path(&self, identifier: &str) -> PathBuf {
        self.destination
            .join(format!("{identifier}.{}", self.format.extension()))
    }

    pub fn world_file_path(&self, identifier: &str) -> PathBuf {
        self.destination
            .join(format!("{identifier}.{}", self.format.world_file_extension()))
    }

    pub fn is_complete(&self, identifier: &str) -> bool {
        inf::fs::is_nonempty_file(&self.image_path(identifier)) && inf::fs::is_nonempty_file(&self.world_file_path(identifier))
    }

    /// Extracts the tile from the band and writes it, unless the tile is already complete.
    /// Cells of padded tiles that lie outside of the band are written as 0.
    pub fn write_tile(&self, spec: &TileSpec, band: &DenseArray<f32>, nodata: Option<f64>) -> Result<TileWriteOutcome> {
        let identifier = spec.identifier();
        if self.is_complete(&identifier) {
            return Ok(TileWriteOutcome::AlreadyPresent);
        }

        let window = band.window(spec.pixel_origin, spec.pixel_extent, f32::NAN);
        let samples = to_u16_samples(&window, nodata);

        self.write_pair(&identifier, spec, &samples)
            .map_err(|source| Error::TileWriteFailed { identifier, source })?;
        Ok(TileWriteOutcome::Written)
    }

    /// Both members are staged first, the world file is moved into place before the image.
    /// A visible image therefore always has a complete world file next to it.
    fn write_pair(&self, identifier: &str, spec: &TileSpec, samples: &DenseArray<u16>) -> geo::Result<()> {
        let image = self.format.encode(&spec.geo_transform, samples)?;
        let world_file = geo::worldfile::format_world_file(&spec.geo_transform);

        let staged_world_file = StagedFile::new(&self.world_file_path(identifier))?;
        staged_world_file.write(world_file)?;

        let staged_image = StagedFile::new(&self.image_path(identifier))?;
        staged_image.write(image)?;

        staged_world_file.publish()?;
        staged_image.publish()?;
        Ok(())
    }
}
