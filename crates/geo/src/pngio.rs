//! 16 bit grayscale PNG encoding of raster tiles.

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use crate::{Columns, DenseArray, Error, RasterSize, Result, Rows};

/// Encodes the samples as a single channel 16 bit PNG, samples are stored in network byte order
pub fn encode_png_u16(data: &DenseArray<u16>) -> Result<Vec<u8>> {
    let width = data.columns().count() as u32;
    let height = data.rows().count() as u32;
    if width == 0 || height == 0 {
        return Err(Error::InvalidArgument("Can not encode an empty image".into()));
    }

    let bytes: Vec<u8> = data.as_slice().iter().flat_map(|v| v.to_be_bytes()).collect();
    let mut encoded: Vec<u8> = Vec::new();

    {
        let w = BufWriter::new(&mut encoded);
        let mut encoder = png::Encoder::new(w, width, height);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Sixteen);

        let mut writer = encoder.write_header()?;
        writer.write_image_data(&bytes)?;
        writer.finish()?;
    }

    Ok(encoded)
}

pub fn write_png_u16(path: &Path, data: &DenseArray<u16>) -> Result {
    let contents = encode_png_u16(data)?;
    inf::fs::create_directory_for_file(path)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Reads a PNG that was written by [`encode_png_u16`]
pub fn read_png_u16(path: &Path) -> Result<DenseArray<u16>> {
    let decoder = png::Decoder::new(BufReader::new(File::open(path)?));
    let mut reader = decoder.read_info()?;

    let (width, height) = {
        let info = reader.info();
        if info.color_type != png::ColorType::Grayscale || info.bit_depth != png::BitDepth::Sixteen {
            return Err(Error::UnsupportedFormat(format!(
                "Expected a 16 bit grayscale png ({:?} {:?})",
                info.color_type, info.bit_depth
            )));
        }

        (info.width as usize, info.height as usize)
    };

    let mut buf = vec![0; width * height * 2];
    reader.next_frame(&mut buf)?;

    let samples = buf.chunks_exact(2).map(|b| u16::from_be_bytes([b[0], b[1]])).collect();
    DenseArray::new(RasterSize::with_rows_cols(Rows(height), Columns(width)), samples)
}
