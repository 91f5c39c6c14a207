//! ESRI world files, the plain text georeferencing sidecar of image formats without native georeferencing.
//!
//! The file contains six lines: pixel width, x rotation, y rotation, pixel height, origin x and origin y.
//! The origin is the top left corner of the top left pixel.

use std::path::{Path, PathBuf};

use crate::{Error, GeoTransform, Result};

pub fn format_world_file(geo_transform: &GeoTransform) -> String {
    let [x, pixel_width, rotation_x, y, rotation_y, pixel_height] = geo_transform.coefficients();
    [pixel_width, rotation_x, rotation_y, pixel_height, x, y]
        .iter()
        .map(|v| format!("{v:.10}\n"))
        .collect()
}

pub fn parse_world_file(contents: &str) -> Result<GeoTransform> {
    let values = contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::parse::<f64>)
        .collect::<std::result::Result<Vec<f64>, _>>()?;

    match values.as_slice() {
        &[pixel_width, rotation_x, rotation_y, pixel_height, x, y] => {
            Ok(GeoTransform::new([x, pixel_width, rotation_x, y, rotation_y, pixel_height]))
        }
        _ => Err(Error::InvalidArgument(format!(
            "A world file contains 6 values, found {}",
            values.len()
        ))),
    }
}

pub fn write_world_file(path: &Path, geo_transform: &GeoTransform) -> Result {
    std::fs::write(path, format_world_file(geo_transform))?;
    Ok(())
}

pub fn read_world_file(path: &Path) -> Result<GeoTransform> {
    parse_world_file(&std::fs::read_to_string(path)?)
}

/// The conventional world file extension: first and last letter of the image extension followed by a 'w'
/// e.g. png -> pgw, tif -> tfw
pub fn world_file_extension(image_extension: &str) -> String {
    let mut chars = image_extension.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) => format!("{first}{last}w"),
        (Some(first), None) => format!("{first}w"),
        _ => "wld".to_string(),
    }
}

pub fn world_file_path(image_path: &Path) -> PathBuf {
    let ext = image_path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    image_path.with_extension(world_file_extension(ext))
}
