use std::{fs::File, io::BufReader, path::Path};

use tiff::decoder::{Decoder, DecodingResult};

use crate::{DenseArray, Error, GeoRaster, Result, geotiff::decoder};

/// Keeps the first sample of every pixel of an interleaved buffer
fn first_sample<T: Copy>(values: Vec<T>, samples_per_pixel: usize, convert: impl Fn(T) -> f32) -> Vec<f32> {
    values.into_iter().step_by(samples_per_pixel.max(1)).map(convert).collect()
}

fn decode_first_band(image: DecodingResult, samples_per_pixel: usize) -> Result<Vec<f32>> {
    Ok(match image {
        DecodingResult::U8(v) => first_sample(v, samples_per_pixel, f32::from),
        DecodingResult::U16(v) => first_sample(v, samples_per_pixel, f32::from),
        DecodingResult::U32(v) => first_sample(v, samples_per_pixel, |x| x as f32),
        DecodingResult::U64(v) => first_sample(v, samples_per_pixel, |x| x as f32),
        DecodingResult::I8(v) => first_sample(v, samples_per_pixel, f32::from),
        DecodingResult::I16(v) => first_sample(v, samples_per_pixel, f32::from),
        DecodingResult::I32(v) => first_sample(v, samples_per_pixel, |x| x as f32),
        DecodingResult::I64(v) => first_sample(v, samples_per_pixel, |x| x as f32),
        DecodingResult::F32(v) => first_sample(v, samples_per_pixel, |x| x),
        DecodingResult::F64(v) => first_sample(v, samples_per_pixel, |x| x as f32),
        #[allow(unreachable_patterns)]
        _ => return Err(Error::UnsupportedFormat("Unsupported GeoTIFF sample format".into())),
    })
}

/// Reads the georeferencing and the first band of a GeoTIFF file
pub fn read_geotiff(path: &Path) -> Result<GeoRaster> {
    let file = BufReader::new(File::open(path)?);
    let mut decoder = Decoder::new(file)?.with_limits(tiff::decoder::Limits::unlimited());
    let meta = decoder::read_metadata(&mut decoder)?;

    let image = decoder.read_image()?;
    let data = decode_first_band(image, meta.band_count)?;
    let band = DenseArray::new(meta.raster_size, data).map_err(|e| {
        Error::Runtime(format!(
            "Decoded GeoTIFF data does not match the image dimensions of '{}' ({e})",
            path.display()
        ))
    })?;

    log::debug!(
        "Read GeoTIFF {} {} {:?} nodata: {:?}",
        path.display(),
        meta.raster_size,
        meta.geo_transform,
        meta.nodata
    );

    Ok(GeoRaster::new(meta.geo_transform, band, meta.nodata, meta.band_count))
}
