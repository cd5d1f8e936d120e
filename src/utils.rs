use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::{MaskError, Result};
use crate::types::ImageAnnotation;

/// Helper function to infer image format from image bytes
pub fn infer_image_format(image_bytes: &[u8]) -> Option<&'static str> {
    if image_bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if image_bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("png")
    } else if image_bytes.starts_with(b"BM") {
        Some("bmp")
    } else if image_bytes.starts_with(&[0x47, 0x49, 0x46]) {
        Some("gif")
    } else if image_bytes.starts_with(b"II*\0") || image_bytes.starts_with(b"MM\0*") {
        Some("tif")
    } else {
        None
    }
}

/// Read and parse a single JSON file into an ImageAnnotation struct.
/// The file is parsed straight from a buffered stream rather than loaded into a string first;
/// embedded image data can make annotation files large.
pub fn read_and_parse_json(path: &Path) -> Result<ImageAnnotation> {
    let file = fs::File::open(path).map_err(|e| MaskError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| MaskError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// List the `*.json` files directly inside `dir`, sorted by file name when `sorted` is set.
pub fn list_annotation_files(dir: &Path, sorted: bool) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/*.json",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let entries = glob(&pattern).map_err(|e| {
        MaskError::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
        )
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|path| path.is_file())
        .collect();

    if sorted {
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    }
    Ok(files)
}

/// Find the raster paired with an annotation by trying each extension in order.
pub fn find_companion_raster<S: AsRef<str>>(json_path: &Path, extensions: &[S]) -> Option<PathBuf> {
    extensions
        .iter()
        .map(|ext| json_path.with_extension(ext.as_ref()))
        .find(|candidate| candidate.is_file())
}

/// Copy `src` into `dir` under `file_name`, returning the destination.
pub fn copy_into(src: &Path, dir: &Path, file_name: &str) -> Result<PathBuf> {
    let dest = dir.join(file_name);
    fs::copy(src, &dest).map_err(|e| MaskError::io(src, e))?;
    Ok(dest)
}

/// Create a progress bar with the given length and label
pub fn create_progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}% {{msg}}",
                label
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Create the output directory, deleting it first if it already exists.
pub fn create_output_directory(path: &Path) -> Result<PathBuf> {
    let prepared = if path.exists() {
        fs::remove_dir_all(path).and_then(|_| fs::create_dir_all(path))
    } else {
        fs::create_dir_all(path)
    };
    prepared.map_err(|source| MaskError::OutputDir {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(path.to_path_buf())
}

/// Delete an output directory. Returns `false` when there was nothing to delete.
pub fn remove_output_directory(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(path).map_err(|source| MaskError::OutputDir {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}
