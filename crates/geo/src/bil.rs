//! Reading of ESRI band interleaved by line rasters (`.bil` with a `.hdr` header).

use std::path::{Path, PathBuf};

use crate::{Columns, DenseArray, Error, GeoRaster, GeoTransform, RasterSize, Result, Rows};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    SignedInt,
    UnsignedInt,
    Float,
}

/// Contents of the `.hdr` file that accompanies a `.bil` file
#[derive(Debug, Clone, PartialEq)]
pub struct BilHeader {
    pub rows: usize,
    pub cols: usize,
    pub bands: usize,
    pub bits: usize,
    pub pixel_type: PixelType,
    pub byte_order: ByteOrder,
    pub skip_bytes: usize,
    pub band_row_bytes: usize,
    pub total_row_bytes: usize,
    /// Center of the top left pixel
    pub ul_x_map: f64,
    pub ul_y_map: f64,
    pub x_dim: f64,
    pub y_dim: f64,
    pub nodata: Option<f64>,
}

fn size_overflow(cols: usize, bits: usize) -> Error {
    Error::InvalidArgument(format!("BIL row of {cols} columns of {bits} bits is too large"))
}

impl BilHeader {
    pub fn parse(contents: &str) -> Result<BilHeader> {
        let mut rows = None;
        let mut cols = None;
        let mut bands = 1;
        let mut bits = 8;
        let mut pixel_type = None;
        let mut byte_order = ByteOrder::LittleEndian;
        let mut skip_bytes = 0;
        let mut band_row_bytes = None;
        let mut total_row_bytes = None;
        let mut ul_x_map = 0.0;
        let mut ul_y_map = None;
        let mut x_dim = 1.0;
        let mut y_dim = 1.0;
        let mut nodata = None;

        for line in contents.lines() {
            let mut parts = line.split_whitespace();
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };

            match key.to_ascii_uppercase().as_str() {
                "NROWS" => rows = Some(value.parse::<usize>()?),
                "NCOLS" => cols = Some(value.parse::<usize>()?),
                "NBANDS" => bands = value.parse::<usize>()?,
                "NBITS" => bits = value.parse::<usize>()?,
                "PIXELTYPE" => {
                    pixel_type = Some(match value.to_ascii_uppercase().as_str() {
                        "SIGNEDINT" => PixelType::SignedInt,
                        "UNSIGNEDINT" => PixelType::UnsignedInt,
                        "FLOAT" => PixelType::Float,
                        other => return Err(Error::UnsupportedFormat(format!("BIL pixel type {other}"))),
                    });
                }
                "BYTEORDER" => {
                    byte_order = match value.to_ascii_uppercase().as_str() {
                        "I" | "LSBFIRST" => ByteOrder::LittleEndian,
                        "M" | "MSBFIRST" => ByteOrder::BigEndian,
                        other => return Err(Error::InvalidArgument(format!("Invalid BIL byte order: {other}"))),
                    };
                }
                "LAYOUT" | "INTERLEAVING" => {
                    if !value.eq_ignore_ascii_case("BIL") {
                        return Err(Error::UnsupportedFormat(format!("Raster layout {value}")));
                    }
                }
                "SKIPBYTES" => skip_bytes = value.parse::<usize>()?,
                "BANDROWBYTES" => band_row_bytes = Some(value.parse::<usize>()?),
                "TOTALROWBYTES" => total_row_bytes = Some(value.parse::<usize>()?),
                "ULXMAP" => ul_x_map = value.parse::<f64>()?,
                "ULYMAP" => ul_y_map = Some(value.parse::<f64>()?),
                "XDIM" => x_dim = value.parse::<f64>()?,
                "YDIM" => y_dim = value.parse::<f64>()?,
                "NODATA" | "NODATA_VALUE" => nodata = Some(value.parse::<f64>()?),
                _ => {}
            }
        }

        let rows = rows.ok_or_else(|| Error::Runtime("BIL header is missing NROWS".into()))?;
        let cols = cols.ok_or_else(|| Error::Runtime("BIL header is missing NCOLS".into()))?;

        let pixel_type = pixel_type.unwrap_or(if bits >= 32 { PixelType::Float } else { PixelType::UnsignedInt });
        match (pixel_type, bits) {
            (PixelType::Float, 32 | 64) | (PixelType::SignedInt | PixelType::UnsignedInt, 8 | 16 | 32) => {}
            _ => {
                return Err(Error::UnsupportedFormat(format!(
                    "BIL sample type {pixel_type:?} with {bits} bits"
                )));
            }
        }

        if bands == 0 {
            return Err(Error::InvalidArgument("BIL header specifies zero bands".into()));
        }

        let row_data_bytes = cols.checked_mul(bits).map(|b| b / 8).ok_or_else(|| size_overflow(cols, bits))?;
        let band_row_bytes = band_row_bytes.unwrap_or(row_data_bytes);
        let total_row_bytes = match total_row_bytes {
            Some(bytes) => bytes,
            None => band_row_bytes.checked_mul(bands).ok_or_else(|| size_overflow(cols, bits))?,
        };
        if band_row_bytes < row_data_bytes || total_row_bytes < band_row_bytes {
            return Err(Error::InvalidArgument(format!(
                "BIL row sizes are too small for {cols} columns of {bits} bits"
            )));
        }

        if rows.checked_mul(cols).is_none() {
            return Err(Error::InvalidArgument(format!("BIL raster of {rows} x {cols} cells is too large")));
        }

        Ok(BilHeader {
            rows,
            cols,
            bands,
            bits,
            pixel_type,
            byte_order,
            skip_bytes,
            band_row_bytes,
            total_row_bytes,
            ul_x_map,
            ul_y_map: ul_y_map.unwrap_or(rows.saturating_sub(1) as f64),
            x_dim,
            y_dim,
            nodata,
        })
    }

    pub fn raster_size(&self) -> RasterSize {
        RasterSize::with_rows_cols(Rows(self.rows), Columns(self.cols))
    }

    /// The ULXMAP and ULYMAP values locate the center of the top left pixel,
    /// the transform is shifted by half a pixel to obtain the corner.
    pub fn geo_transform(&self) -> GeoTransform {
        GeoTransform::from_top_left_and_cell_size(
            self.ul_x_map - self.x_dim / 2.0,
            self.ul_y_map + self.y_dim / 2.0,
            self.x_dim,
            -self.y_dim,
        )
    }

    fn bytes_per_sample(&self) -> usize {
        self.bits / 8
    }

    fn decode_sample(&self, bytes: &[u8]) -> f32 {
        macro_rules! from_bytes {
            ($t:ty, $n:literal) => {{
                let mut buf = [0u8; $n];
                buf.copy_from_slice(&bytes[..$n]);
                match self.byte_order {
                    ByteOrder::LittleEndian => <$t>::from_le_bytes(buf),
                    ByteOrder::BigEndian => <$t>::from_be_bytes(buf),
                }
            }};
        }

        match (self.pixel_type, self.bits) {
            (PixelType::UnsignedInt, 8) => f32::from(bytes[0]),
            (PixelType::SignedInt, 8) => f32::from(bytes[0] as i8),
            (PixelType::UnsignedInt, 16) => f32::from(from_bytes!(u16, 2)),
            (PixelType::SignedInt, 16) => f32::from(from_bytes!(i16, 2)),
            (PixelType::UnsignedInt, 32) => from_bytes!(u32, 4) as f32,
            (PixelType::SignedInt, 32) => from_bytes!(i32, 4) as f32,
            (PixelType::Float, 32) => from_bytes!(f32, 4),
            (PixelType::Float, 64) => from_bytes!(f64, 8) as f32,
            _ => f32::NAN,
        }
    }

    /// Number of bytes the `.bil` file must contain to hold the first band
    fn required_data_size(&self) -> Result<usize> {
        let too_large = || Error::InvalidArgument(format!("BIL raster of {} x {} cells is too large", self.rows, self.cols));

        let sample_size = self.bytes_per_sample();
        let row_data_bytes = self.cols.checked_mul(sample_size).ok_or_else(too_large)?;
        if sample_size == 0 || row_data_bytes > self.band_row_bytes || self.band_row_bytes > self.total_row_bytes {
            return Err(Error::InvalidArgument(format!(
                "Inconsistent BIL row sizes: {} columns of {} bits in rows of {} bytes",
                self.cols, self.bits, self.band_row_bytes
            )));
        }

        if self.rows == 0 {
            return Ok(0);
        }

        self.total_row_bytes
            .checked_mul(self.rows - 1)
            .and_then(|bytes| bytes.checked_add(self.skip_bytes))
            .and_then(|bytes| bytes.checked_add(self.band_row_bytes))
            .ok_or_else(too_large)
    }

    /// Decodes the first band from the raw contents of the `.bil` file
    pub fn decode_first_band(&self, raw: &[u8]) -> Result<DenseArray<f32>> {
        let required = self.required_data_size()?;
        if raw.len() < required {
            return Err(Error::Runtime(format!(
                "BIL data is truncated: expected at least {required} bytes, got {}",
                raw.len()
            )));
        }

        // every row lies within `required` bytes, so the cell count fits in memory as well
        let sample_size = self.bytes_per_sample();
        let mut data = Vec::with_capacity(self.rows * self.cols);
        for row in 0..self.rows {
            let row_start = self.skip_bytes + row * self.total_row_bytes;
            let row_bytes = &raw[row_start..row_start + self.cols * sample_size];
            data.extend(row_bytes.chunks_exact(sample_size).map(|sample| self.decode_sample(sample)));
        }

        DenseArray::new(self.raster_size(), data)
    }
}

/// Locates the header that belongs to a `.bil` file
pub fn header_path(path: &Path) -> Result<PathBuf> {
    for ext in ["hdr", "HDR"] {
        let candidate = path.with_extension(ext);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(Error::InvalidPath(path.with_extension("hdr")))
}

pub fn read_bil(path: &Path) -> Result<GeoRaster> {
    let header = BilHeader::parse(&std::fs::read_to_string(header_path(path)?)?)?;
    let raw = std::fs::read(path)?;
    let band = header.decode_first_band(&raw)?;

    log::debug!(
        "Read BIL {} {} {:?} nodata: {:?}",
        path.display(),
        header.raster_size(),
        header.geo_transform(),
        header.nodata
    );

    Ok(GeoRaster::new(header.geo_transform(), band, header.nodata, header.bands))
}
