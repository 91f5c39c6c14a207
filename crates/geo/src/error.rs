use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid path: {0}")]
    InvalidPath(std::path::PathBuf),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Unsupported raster format: {0}")]
    UnsupportedFormat(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("TIFF error: {0}")]
    TiffError(#[from] tiff::TiffError),
    #[error("PNG decode error: {0}")]
    PngDecode(#[from] png::DecodingError),
    #[error("PNG encode error: {0}")]
    PngEncode(#[from] png::EncodingError),
    #[error("{0}")]
    Inf(#[from] inf::Error),
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error::InvalidNumber(err.to_string())
    }
}

impl From<std::num::ParseFloatError> for Error {
    fn from(err: std::num::ParseFloatError) -> Self {
        Error::InvalidNumber(err.to_string())
    }
}
