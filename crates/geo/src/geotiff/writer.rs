use std::{
    io::{Cursor, Seek, Write},
    path::Path,
};

use tiff::{
    encoder::{DirectoryEncoder, TiffEncoder, TiffKind, colortype},
    tags::Tag,
};

use crate::{DenseArray, Error, GeoTransform, Result};

const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Encodes a 16 bit single band GeoTIFF in memory.
/// The image is stored uncompressed in strips, georeferenced with a pixel scale and a top left tie point.
pub fn encode_geotiff_u16(geo_transform: &GeoTransform, data: &DenseArray<u16>) -> Result<Vec<u8>> {
    if geo_transform.has_rotation() {
        return Err(Error::InvalidArgument(
            "Rotated geo transforms can not be stored as a pixel scale".into(),
        ));
    }

    let width = data.columns().count() as u32;
    let height = data.rows().count() as u32;
    if width == 0 || height == 0 {
        return Err(Error::InvalidArgument("Can not encode an empty image".into()));
    }

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buffer)?;
        let mut image = encoder.new_image::<colortype::Gray16>(width, height)?;
        write_spatial_reference_tags(image.encoder(), geo_transform)?;
        image.write_data(data.as_slice())?;
    }

    Ok(buffer.into_inner())
}

pub fn write_geotiff_u16(path: &Path, geo_transform: &GeoTransform, data: &DenseArray<u16>) -> Result {
    let contents = encode_geotiff_u16(geo_transform, data)?;
    inf::fs::create_directory_for_file(path)?;
    std::fs::write(path, contents)?;
    Ok(())
}

fn write_spatial_reference_tags<W: Write + Seek, K: TiffKind>(
    dir_encoder: &mut DirectoryEncoder<'_, W, K>,
    geo_transform: &GeoTransform,
) -> Result {
    let pixel_scale = [geo_transform.cell_size_x().abs(), geo_transform.cell_size_y().abs(), 0.0];
    dir_encoder.write_tag(Tag::ModelPixelScaleTag, &pixel_scale[..])?;

    // Raster (I, J, K) of the top left corner followed by its model (X, Y, Z)
    let tie_points = [0.0, 0.0, 0.0, geo_transform.top_left_x(), geo_transform.top_left_y(), 0.0];
    dir_encoder.write_tag(Tag::ModelTiepointTag, &tie_points[..])?;

    let geo_keys: [u16; 12] = [
        1,
        1,
        0,
        2, // version, revision, minor revision, key count
        1024,
        0,
        1,
        MODEL_TYPE_GEOGRAPHIC,
        1025,
        0,
        1,
        RASTER_PIXEL_IS_AREA,
    ];
    dir_encoder.write_tag(Tag::GeoKeyDirectoryTag, &geo_keys[..])?;

    Ok(())
}
