use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by mask conversion, compositing and annotation loading.
#[derive(Debug, Error)]
pub enum Error {
    /// A polygon contour with fewer than 3 points (or an odd coordinate count).
    ///
    /// The rasterizer skips such contours instead of failing.
    #[error("degenerate contour with {values} coordinate value(s); need an even count >= 6")]
    DegenerateContour { values: usize },

    #[error("length mismatch: {what} has {actual} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("malformed RLE: runs sum to {actual}, expected {expected}")]
    MalformedRle { expected: u64, actual: u64 },

    /// Dimensions are `(height, width)`.
    #[error("dimension mismatch: got {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("invalid compressed RLE string at byte {position}")]
    InvalidRleString { position: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse annotations from {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to load image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid font data: {0}")]
    Font(#[from] ab_glyph::InvalidFont),
}

pub type Result<T> = std::result::Result<T, Error>;
