//! Error types for the annotation-to-mask pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while converting LabelMe annotations into masks.
#[derive(Error, Debug)]
pub enum MaskError {
    /// The annotation file is not valid LabelMe JSON
    #[error("Failed to parse JSON ({}): {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A file could not be read, written or copied
    #[error("IO error ({}): {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An image could not be decoded or encoded
    #[error("Image error ({}): {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The embedded image data is unusable
    #[error("Invalid image data ({}): {message}", path.display())]
    ImageData { path: PathBuf, message: String },

    /// A shape does not describe a fillable region
    #[error("Invalid shape #{index} with label '{label}': {reason}")]
    InvalidShape {
        index: usize,
        label: String,
        reason: String,
    },

    /// The remap table has no output value for a class index
    #[error("Remap table has no entry for class index {0}")]
    UnmappedIndex(u8),

    /// A mask value has no palette color
    #[error("Mask value {value} is outside the palette of {len} colors")]
    PaletteIndex { value: u8, len: usize },

    /// The class scheme is inconsistent or could not be loaded
    #[error("Invalid class scheme: {0}")]
    InvalidScheme(String),

    /// The output directory could not be prepared
    #[error("Failed to prepare output directory ({}): {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MaskError {
    /// Create an IO error bound to a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an image error bound to a path.
    pub fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid shape error.
    pub fn invalid_shape(index: usize, label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidShape {
            index,
            label: label.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error invalidates the whole job rather than a single file.
    ///
    /// Configuration errors fail identically for every remaining file, so the batch stops on the
    /// first one. Data errors only affect the file that produced them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnmappedIndex(_) | Self::InvalidScheme(_) | Self::OutputDir { .. }
        )
    }
}

pub type Result<T, E = MaskError> = std::result::Result<T, E>;
