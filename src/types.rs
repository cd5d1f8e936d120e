use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::error::{MaskError, Result};
use crate::utils::read_and_parse_json;

// Extensions tried, in order, when looking for the raster paired with an annotation
pub const RASTER_EXTENSIONS: [&str; 2] = ["png", "tif"];

// Largest image, in pixels, a mask is rasterized for
pub const MAX_IMAGE_PIXELS: u64 = 1 << 27;

// Default name of the output folder created inside the input directory
pub const DEFAULT_OUTPUT_NAME: &str = "dataset";

fn default_shape_type() -> String {
    "polygon".to_string()
}

// LabelMe writes `"shape_type": null` for polygons
fn shape_type_or_polygon<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_shape_type))
}

// The Shape struct representing annotated shapes
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Shape {
    pub label: String,
    pub points: Vec<(f64, f64)>,
    #[serde(
        default = "default_shape_type",
        deserialize_with = "shape_type_or_polygon"
    )]
    pub shape_type: String,
}

impl Shape {
    pub fn polygon(label: impl Into<String>, points: Vec<(f64, f64)>) -> Self {
        Self {
            label: label.into(),
            points,
            shape_type: default_shape_type(),
        }
    }
}

// The ImageAnnotation struct representing the annotation information of an image
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnnotation {
    #[serde(default)]
    pub shapes: Vec<Shape>,
    #[serde(default)]
    pub image_path: String,
    pub image_data: Option<String>,
    pub image_height: Option<u32>,
    pub image_width: Option<u32>,
}

/// The image an annotation was drawn on.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub width: u32,
    pub height: u32,
    /// Encoded bytes carried inside the annotation, if any
    pub embedded: Option<Vec<u8>>,
}

/// One loaded annotation file: its shapes plus the resolved source image.
#[derive(Debug, Clone)]
pub struct AnnotationRecord {
    pub json_path: PathBuf,
    pub image: SourceImage,
    pub shapes: Vec<Shape>,
}

impl AnnotationRecord {
    /// Read an annotation file and resolve the size of its source image.
    ///
    /// The embedded `imageData` is preferred, then the file at `imagePath` (relative to the
    /// annotation). The declared `imageWidth`/`imageHeight` are only used when neither can be read.
    pub fn load(json_path: &Path) -> Result<Self> {
        let annotation = read_and_parse_json(json_path)?;
        Self::from_annotation(json_path, annotation)
    }

    pub fn from_annotation(json_path: &Path, annotation: ImageAnnotation) -> Result<Self> {
        let declared = match (annotation.image_width, annotation.image_height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        };

        let embedded = match annotation.image_data.as_deref() {
            Some(data) if !data.is_empty() => {
                Some(STANDARD.decode(data).map_err(|e| MaskError::ImageData {
                    path: json_path.to_path_buf(),
                    message: e.to_string(),
                })?)
            }
            _ => None,
        };

        let probed = match &embedded {
            Some(bytes) => Some(
                image::ImageReader::new(Cursor::new(bytes.as_slice()))
                    .with_guessed_format()
                    .map_err(|e| MaskError::io(json_path, e))?
                    .into_dimensions()
                    .map_err(|e| MaskError::image(json_path, e))?,
            ),
            None => probe_referenced_image(json_path, &annotation.image_path),
        };

        let (width, height) = match (probed, declared) {
            (Some(actual), Some(declared)) if actual != declared => {
                log::warn!(
                    "Declared image size {}x{} does not match the actual image {}x{} ({}); using the actual size",
                    declared.0,
                    declared.1,
                    actual.0,
                    actual.1,
                    json_path.display()
                );
                actual
            }
            (Some(actual), _) => actual,
            (None, Some(declared)) => declared,
            (None, None) => {
                return Err(MaskError::ImageData {
                    path: json_path.to_path_buf(),
                    message: "image size cannot be determined".to_string(),
                })
            }
        };

        if u64::from(width) * u64::from(height) > MAX_IMAGE_PIXELS {
            return Err(MaskError::ImageData {
                path: json_path.to_path_buf(),
                message: format!(
                    "image size {}x{} exceeds the limit of {} pixels",
                    width, height, MAX_IMAGE_PIXELS
                ),
            });
        }

        Ok(Self {
            json_path: json_path.to_path_buf(),
            image: SourceImage {
                width,
                height,
                embedded,
            },
            shapes: annotation.shapes,
        })
    }
}

// Dimensions of the image referenced by `imagePath`, if it can be read
fn probe_referenced_image(json_path: &Path, image_path: &str) -> Option<(u32, u32)> {
    if image_path.is_empty() {
        return None;
    }
    let base_dir = json_path.parent().unwrap_or_else(|| Path::new("."));
    let path = base_dir.join(image_path);
    match image::image_dimensions(&path) {
        Ok(dims) => Some(dims),
        Err(e) => {
            log::debug!("Cannot read referenced image {}: {}", path.display(), e);
            None
        }
    }
}

/// A single conversion run: one input directory into one output directory.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub name: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl ConversionJob {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: "Labelme to mask".to_string(),
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Job writing into `<input_dir>/<output_name>`.
    pub fn in_place(input_dir: impl Into<PathBuf>, output_name: &str) -> Self {
        let input_dir = input_dir.into();
        let output_dir = input_dir.join(output_name);
        Self::new(input_dir, output_dir)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

// Struct to hold processing statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConversionStats {
    pub total_files_processed: usize,
    pub masks_written: usize,
    pub skipped_without_sentinel: usize,
    pub failed_conversions: usize,
    pub companions_copied: usize,
}

impl ConversionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_summary(&self) {
        log::info!("=== Conversion Summary ===");
        log::info!("Total files processed: {}", self.total_files_processed);
        log::info!("Masks written: {}", self.masks_written);
        log::info!(
            "Skipped (sentinel class absent): {}",
            self.skipped_without_sentinel
        );
        log::info!("Companion files copied: {}", self.companions_copied);
        log::info!("Failed conversions: {}", self.failed_conversions);

        if self.failed_conversions > 0 {
            log::warn!(
                "{} of {} files failed to convert",
                self.failed_conversions,
                self.total_files_processed
            );
        }
    }
}
