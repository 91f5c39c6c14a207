use std::io::{Read, Seek};

use tiff::{decoder::Decoder, tags::Tag};

use crate::{Columns, Error, GeoTransform, RasterSize, Result, Rows};

#[derive(Debug, Clone, PartialEq)]
pub struct GeoTiffMetadata {
    pub raster_size: RasterSize,
    pub band_count: usize,
    pub geo_transform: GeoTransform,
    pub nodata: Option<f64>,
}

pub(super) fn read_metadata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTiffMetadata> {
    Ok(GeoTiffMetadata {
        raster_size: read_raster_size(decoder)?,
        band_count: decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1) as usize,
        geo_transform: read_geo_transform(decoder)?,
        nodata: read_nodata_value(decoder),
    })
}

fn read_raster_size<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<RasterSize> {
    Ok(RasterSize::with_rows_cols(
        Rows(decoder.get_tag_u32(Tag::ImageLength)? as usize),
        Columns(decoder.get_tag_u32(Tag::ImageWidth)? as usize),
    ))
}

fn read_pixel_scale<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<(f64, f64)> {
    if let Ok(values) = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag) {
        if values.len() < 2 {
            return Err(Error::Runtime("ModelPixelScale must have at least 2 values".into()));
        }

        Ok((values[0], values[1]))
    } else {
        Err(Error::Runtime("ModelPixelScale tag not found".into()))
    }
}

fn read_tie_points<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<[f64; 6]> {
    if let Ok(values) = decoder.get_tag_f64_vec(Tag::ModelTiepointTag) {
        if values.len() < 6 {
            return Err(Error::Runtime("ModelTiepoint must have 6 values".into()));
        }

        let mut tie_points = [0.0; 6];
        tie_points.copy_from_slice(&values[0..6]);
        Ok(tie_points)
    } else {
        Err(Error::Runtime("ModelTiepoint tag not found".into()))
    }
}

fn read_model_transformation<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<[f64; 8]> {
    let values = decoder.get_tag_f64_vec(Tag::ModelTransformationTag).ok()?;
    if values.len() < 8 {
        return None;
    }

    let mut transform = [0.0; 8];
    transform.copy_from_slice(&values[0..8]);
    Some(transform)
}

fn read_geo_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    if let Some(transform) = read_model_transformation(decoder) {
        return Ok(GeoTransform::new([
            transform[3],
            transform[0],
            transform[1],
            transform[7],
            transform[4],
            transform[5],
        ]));
    }

    let (pixel_scale_x, pixel_scale_y) = read_pixel_scale(decoder)?;
    if pixel_scale_x == 0.0 || pixel_scale_y == 0.0 {
        return Err(Error::Runtime("No cell sizes present in geotiff".into()));
    }

    let tie_points = read_tie_points(decoder)?;
    let cell_size_y = -pixel_scale_y;
    Ok(GeoTransform::new([
        tie_points[3] - tie_points[0] * pixel_scale_x,
        pixel_scale_x,
        0.0,
        tie_points[4] - tie_points[1] * cell_size_y,
        0.0,
        cell_size_y,
    ]))
}

fn read_nodata_value<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let nodata_str = decoder.get_tag_ascii_string(Tag::GdalNodata).ok()?;
    nodata_str.trim_matches(char::from(0)).trim().parse::<f64>().ok()
}
