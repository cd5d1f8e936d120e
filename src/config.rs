use clap::{Parser, ValueEnum};
use std::path::Path;

use crate::encode::MaskPolicy;
use crate::error::Result;
use crate::scheme::ClassScheme;
use crate::types::{DEFAULT_OUTPUT_NAME, RASTER_EXTENSIONS};

/// Command-line arguments parser for converting LabelMe JSON to segmentation masks.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct Args {
    /// Directories containing LabelMe JSON files; each is converted as its own job
    #[arg(short = 'd', long = "json_dir", required = true, num_args = 1..)]
    pub json_dirs: Vec<String>,

    /// Name of the output folder created inside each directory (deleted and recreated)
    #[arg(long = "output_name", default_value = DEFAULT_OUTPUT_NAME, value_parser = validate_output_name)]
    pub output_name: String,

    /// Built-in class scheme
    #[arg(long = "preset", value_enum, default_value = "six-class")]
    pub preset: Preset,

    /// JSON file with a custom class scheme; takes precedence over --preset
    #[arg(long = "scheme")]
    pub scheme: Option<String>,

    /// Only export masks containing this output value
    #[arg(long = "sentinel", conflicts_with = "no_sentinel")]
    pub sentinel: Option<u8>,

    /// Export every mask regardless of its content
    #[arg(long = "no_sentinel")]
    pub no_sentinel: bool,

    /// Pixel encoding of exported masks; defaults to the scheme's choice
    #[arg(long = "encoding", value_enum)]
    pub encoding: Option<Encoding>,

    /// What to do with masks that lack the sentinel value
    #[arg(long = "ungated", value_enum, default_value = "skip")]
    pub ungated: UngatedPolicy,

    /// Naming of mask files: '<name>_mask.png' or '<name>.png'
    #[arg(long = "mask_naming", value_enum, default_value = "suffixed")]
    pub mask_naming: MaskNaming,

    /// Process files in directory order instead of sorted by name
    #[arg(long = "unsorted")]
    pub unsorted: bool,

    /// Extensions tried, in order, for the raster paired with each JSON file
    #[arg(long = "raster_ext", value_delimiter = ',', default_values = RASTER_EXTENSIONS)]
    pub raster_ext: Vec<String>,

    /// Write the image embedded in the JSON when no raster file is found
    #[arg(long = "extract_embedded")]
    pub extract_embedded: bool,

    /// Delete the output folder of each directory and exit
    #[arg(long = "delete")]
    pub delete: bool,
}

// Enumeration for the built-in class schemes
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum Preset {
    #[default]
    SixClass,
    FiveClass,
}

impl Preset {
    pub fn scheme(self) -> ClassScheme {
        match self {
            Preset::SixClass => ClassScheme::six_class(),
            Preset::FiveClass => ClassScheme::five_class(),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum Encoding {
    Gray,
    Color,
}

// Handling of masks that fail the sentinel gate
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum UngatedPolicy {
    /// Write nothing
    #[default]
    Skip,
    /// Write the single-channel mask without companion files
    WriteGray,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum MaskNaming {
    #[default]
    Suffixed,
    Plain,
}

impl MaskNaming {
    pub fn file_name(self, stem: &str) -> String {
        match self {
            MaskNaming::Suffixed => format!("{}_mask.png", stem),
            MaskNaming::Plain => format!("{}.png", stem),
        }
    }
}

/// Everything a conversion run needs besides its directories.
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub scheme: ClassScheme,
    pub ungated: UngatedPolicy,
    pub mask_naming: MaskNaming,
    pub sort_inputs: bool,
    pub raster_extensions: Vec<String>,
    pub extract_embedded_image: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self::new(ClassScheme::six_class())
    }
}

impl ConversionConfig {
    pub fn new(scheme: ClassScheme) -> Self {
        Self {
            scheme,
            ungated: UngatedPolicy::default(),
            mask_naming: MaskNaming::default(),
            sort_inputs: true,
            raster_extensions: RASTER_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            extract_embedded_image: false,
        }
    }

    pub fn policy(&self) -> MaskPolicy {
        MaskPolicy::from_scheme(&self.scheme, self.ungated)
    }

    /// Checks that must pass before any file is touched.
    pub fn validate(&self) -> Result<()> {
        self.scheme.validate()
    }
}

impl Args {
    /// Build the conversion configuration described by these arguments.
    pub fn to_config(&self) -> Result<ConversionConfig> {
        let mut scheme = match &self.scheme {
            Some(path) => ClassScheme::load(Path::new(path))?,
            None => self.preset.scheme(),
        };
        if let Some(sentinel) = self.sentinel {
            scheme.sentinel = Some(sentinel);
        }
        if self.no_sentinel {
            scheme.sentinel = None;
        }
        if let Some(encoding) = self.encoding {
            scheme.color = encoding == Encoding::Color;
        }

        Ok(ConversionConfig {
            ungated: self.ungated,
            mask_naming: self.mask_naming,
            sort_inputs: !self.unsorted,
            raster_extensions: self.raster_ext.clone(),
            extract_embedded_image: self.extract_embedded,
            ..ConversionConfig::new(scheme)
        })
    }
}

// Validate that the output folder name is a single plain path component
fn validate_output_name(s: &str) -> std::result::Result<String, String> {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err("NAME must be a folder name".to_string());
    }
    if trimmed.contains(['/', '\\']) {
        return Err("NAME must not contain path separators".to_string());
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_output_name() {
        assert_eq!(validate_output_name("dataset"), Ok("dataset".to_string()));
        assert_eq!(validate_output_name(" masks "), Ok("masks".to_string()));
        assert!(validate_output_name("").is_err());
        assert!(validate_output_name("..").is_err());
        assert!(validate_output_name("a/b").is_err());
        assert!(validate_output_name("a\\b").is_err());
    }

    #[test]
    fn test_args_to_config_overrides_preset() {
        let args = Args::parse_from([
            "labelme2mask",
            "-d",
            "data",
            "--preset",
            "five-class",
            "--sentinel",
            "3",
            "--encoding",
            "color",
            "--unsorted",
            "--raster_ext",
            "tif,png",
        ]);
        let config = args.to_config().unwrap();
        assert_eq!(config.scheme.sentinel, Some(3));
        assert!(config.scheme.color);
        assert!(!config.sort_inputs);
        assert_eq!(config.raster_extensions, vec!["tif", "png"]);
        assert_eq!(config.scheme.labels.len(), 5);
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["labelme2mask", "-d", "a", "b"]);
        assert_eq!(args.json_dirs, vec!["a", "b"]);
        assert_eq!(args.output_name, "dataset");
        let config = args.to_config().unwrap();
        assert_eq!(config.scheme, ClassScheme::six_class());
        assert_eq!(config.raster_extensions, vec!["png", "tif"]);
        assert_eq!(config.ungated, UngatedPolicy::Skip);
        assert!(config.sort_inputs);
    }

    #[test]
    fn test_no_sentinel_clears_gate() {
        let args = Args::parse_from(["labelme2mask", "-d", "a", "--no_sentinel"]);
        assert_eq!(args.to_config().unwrap().scheme.sentinel, None);
    }
}
