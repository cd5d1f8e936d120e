//! LabelMe to segmentation mask converter
//!
//! This library rasterizes LabelMe polygon annotations into per-pixel class masks, remaps the
//! class indices to output pixel values, optionally recolors them through a palette, and
//! exports the result together with the source image and annotation.

pub mod config;
pub mod converter;
pub mod encode;
pub mod error;
pub mod job;
pub mod progress;
pub mod rasterize;
pub mod remap;
pub mod scheme;
pub mod types;
pub mod utils;

// Re-export commonly used types and functions
pub use config::{Args, ConversionConfig, Encoding, MaskNaming, Preset, UngatedPolicy};
pub use converter::{BatchConverter, BatchState, FileOutcome, JobOutcome};
pub use encode::{colorize, contains_value, Encoded, MaskPolicy, OutputMask};
pub use error::MaskError;
pub use job::JobController;
pub use progress::{log_event, CancellationToken, FnSink, JobEvent, LogSink, ProgressSink};
pub use rasterize::{rasterize_shapes, LabelMask};
pub use remap::remap;
pub use scheme::{ClassScheme, LabelIndexMap, Palette, RemapTable};
pub use types::{AnnotationRecord, ConversionJob, ConversionStats, ImageAnnotation, Shape};
