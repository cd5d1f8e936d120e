use image::{GrayImage, ImageFormat, Rgb, RgbImage};
use std::path::Path;

use crate::config::UngatedPolicy;
use crate::error::{MaskError, Result};
use crate::scheme::{ClassScheme, Palette};

/// A finished mask, ready to be written as PNG.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputMask {
    Gray(GrayImage),
    Color(RgbImage),
}

impl OutputMask {
    pub fn channels(&self) -> u8 {
        match self {
            OutputMask::Gray(_) => 1,
            OutputMask::Color(_) => 3,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            OutputMask::Gray(img) => img.dimensions(),
            OutputMask::Color(img) => img.dimensions(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let written = match self {
            OutputMask::Gray(img) => img.save_with_format(path, ImageFormat::Png),
            OutputMask::Color(img) => img.save_with_format(path, ImageFormat::Png),
        };
        written.map_err(|e| MaskError::image(path, e))
    }
}

/// Outcome of running a remapped mask through the export gate.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    /// The mask passed the gate; it is exported together with its companion files
    Qualified(OutputMask),
    /// The mask lacks the sentinel value but is still written, alone and single-channel
    Ungated(GrayImage),
    /// The mask lacks the sentinel value and nothing is written
    Filtered,
}

/// Gate and encoding settings for remapped masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskPolicy {
    pub sentinel: Option<u8>,
    pub color: bool,
    pub ungated: UngatedPolicy,
}

impl MaskPolicy {
    pub fn from_scheme(scheme: &ClassScheme, ungated: UngatedPolicy) -> Self {
        Self {
            sentinel: scheme.sentinel,
            color: scheme.color,
            ungated,
        }
    }

    pub fn qualifies(&self, mask: &GrayImage) -> bool {
        self.sentinel
            .map_or(true, |sentinel| contains_value(mask, sentinel))
    }

    pub fn encode(&self, mask: GrayImage, palette: &Palette) -> Result<Encoded> {
        if !self.qualifies(&mask) {
            return Ok(match self.ungated {
                UngatedPolicy::Skip => Encoded::Filtered,
                UngatedPolicy::WriteGray => Encoded::Ungated(mask),
            });
        }
        let output = if self.color {
            OutputMask::Color(colorize(&mask, palette)?)
        } else {
            OutputMask::Gray(mask)
        };
        Ok(Encoded::Qualified(output))
    }
}

pub fn contains_value(mask: &GrayImage, value: u8) -> bool {
    mask.as_raw().contains(&value)
}

/// Expand a single-channel mask into RGB by direct palette lookup.
pub fn colorize(mask: &GrayImage, palette: &Palette) -> Result<RgbImage> {
    let mut out = RgbImage::new(mask.width(), mask.height());
    for (dst, src) in out.pixels_mut().zip(mask.pixels()) {
        *dst = Rgb(palette.color(src.0[0])?);
    }
    Ok(out)
}
