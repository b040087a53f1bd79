use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("invalid magic number in image header")]
    InvalidMagic,

    #[error("unsupported image version: {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("image truncated reading {what} at offset {offset}")]
    Truncated { what: &'static str, offset: usize },

    #[error("malformed object record at offset {0}")]
    InvalidRecord(usize),

    #[error("object not found")]
    NotFound,

    #[error("object is not a file")]
    NotAFile,

    #[error("unsupported compression kind: {0}")]
    UnsupportedCompression(u8),

    #[error("seek target out of range")]
    InvalidSeek,

    #[error("decompression failed: {0}")]
    Decode(String),

    #[error("invalid path string in image")]
    InvalidPath,

    #[error("too many objects for a single image: {0}")]
    TooManyObjects(usize),

    #[error("object too large for the image format: {0} bytes")]
    ObjectTooLarge(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
