//! Batch conversion of a directory of LabelMe annotations into masks.

use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::ConversionConfig;
use crate::encode::{Encoded, OutputMask};
use crate::error::{MaskError, Result};
use crate::progress::{percent_complete, CancellationToken, JobEvent, ProgressSink};
use crate::rasterize::rasterize_shapes;
use crate::remap::remap;
use crate::types::{AnnotationRecord, ConversionJob, ConversionStats};
use crate::utils::{
    copy_into, create_output_directory, find_companion_raster, infer_image_format,
    list_annotation_files,
};

/// Where a batch run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Discovering,
    Processing { index: usize, total: usize },
    Completed,
    Cancelled,
    Failed,
}

/// How a batch run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(ConversionStats),
    Cancelled(ConversionStats),
    Failed(String),
}

/// Result of converting a single annotation file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Written { mask: PathBuf, companions: usize },
    /// The mask did not pass the sentinel gate and nothing was written
    Filtered,
}

/// Runs one [`ConversionJob`] from start to finish on the calling thread.
pub struct BatchConverter<S: ProgressSink> {
    job: ConversionJob,
    config: Arc<ConversionConfig>,
    token: CancellationToken,
    sink: S,
    state: BatchState,
    stats: ConversionStats,
}

impl<S: ProgressSink> BatchConverter<S> {
    pub fn new(
        job: ConversionJob,
        config: Arc<ConversionConfig>,
        token: CancellationToken,
        sink: S,
    ) -> Self {
        Self {
            job,
            config,
            token,
            sink,
            state: BatchState::Idle,
            stats: ConversionStats::new(),
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn stats(&self) -> &ConversionStats {
        &self.stats
    }

    /// Convert every annotation in the job's input directory.
    ///
    /// Per-file failures are reported and skipped. Configuration problems and failures to
    /// prepare the output directory end the run with a single error event and no `Finished`.
    pub fn run(&mut self) -> JobOutcome {
        match self.execute() {
            Ok(outcome) => outcome,
            Err(e) => {
                self.transition(BatchState::Failed);
                let message = format!("{} failed: {}", self.job.name, e);
                self.sink.emit(JobEvent::Error(message.clone()));
                JobOutcome::Failed(message)
            }
        }
    }

    fn execute(&mut self) -> Result<JobOutcome> {
        let start = Instant::now();
        self.config.validate()?;

        self.transition(BatchState::Discovering);
        let input_dir = self.job.input_dir.clone();
        let output_dir = self.job.output_dir.clone();
        self.log("-".repeat(100));
        self.log(format!(
            "Converting {} to {}",
            input_dir.display(),
            output_dir.display()
        ));

        if !input_dir.is_dir() {
            return Err(MaskError::io(
                &input_dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "input directory not found"),
            ));
        }
        if output_dir.exists() {
            self.log(format!(
                "Output directory {} already exists. Deleting it...",
                output_dir.display()
            ));
        }
        create_output_directory(&output_dir)?;

        let json_files = list_annotation_files(&input_dir, self.config.sort_inputs)?;
        let total = json_files.len();
        self.log(format!(
            "Found {} json files in {}",
            total,
            input_dir.display()
        ));
        self.log("-".repeat(100));

        for (index, json_path) in json_files.iter().enumerate() {
            if self.token.is_cancelled() {
                self.transition(BatchState::Cancelled);
                self.sink.emit(JobEvent::Cancelled {
                    job_name: self.job.name.clone(),
                    processed: index,
                    total,
                    seconds: start.elapsed().as_secs_f64(),
                });
                return Ok(JobOutcome::Cancelled(self.stats.clone()));
            }
            self.transition(BatchState::Processing { index, total });
            self.stats.total_files_processed += 1;

            match self.convert_file(json_path, &output_dir) {
                Ok(FileOutcome::Written { mask, companions }) => {
                    debug!("Wrote {}", mask.display());
                    self.stats.masks_written += 1;
                    self.stats.companions_copied += companions;
                }
                Ok(FileOutcome::Filtered) => {
                    debug!("No sentinel class in {}", json_path.display());
                    self.stats.skipped_without_sentinel += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    self.stats.failed_conversions += 1;
                    self.sink.emit(JobEvent::Error(format!(
                        "Failed to convert {}: {}",
                        json_path.display(),
                        e
                    )));
                }
            }

            self.sink
                .emit(JobEvent::Runtime(start.elapsed().as_secs_f64()));
            self.sink
                .emit(JobEvent::Progress(percent_complete(index + 1, total)));
        }

        self.transition(BatchState::Completed);
        self.stats.print_summary();
        self.sink.emit(JobEvent::Finished {
            job_name: self.job.name.clone(),
            seconds: start.elapsed().as_secs_f64(),
        });
        Ok(JobOutcome::Completed(self.stats.clone()))
    }

    /// Rasterize, remap and encode one annotation, then write what the gate lets through.
    pub fn convert_file(&self, json_path: &Path, output_dir: &Path) -> Result<FileOutcome> {
        let scheme = &self.config.scheme;
        let record = AnnotationRecord::load(json_path)?;
        let labels = rasterize_shapes(
            record.image.height,
            record.image.width,
            &record.shapes,
            &scheme.labels,
        )?;
        let remapped = remap(&labels, &scheme.remap)?;

        let stem = sanitize_filename::sanitize(
            json_path
                .file_stem()
                .map(|s| s.to_string_lossy())
                .unwrap_or_default(),
        );
        let mask_name = self.config.mask_naming.file_name(&stem);
        let mask_path = output_dir.join(&mask_name);

        match self.config.policy().encode(remapped, &scheme.palette)? {
            Encoded::Qualified(mask) => {
                mask.save(&mask_path)?;
                let companions = self
                    .copy_companions(&record, &stem, &mask_name, output_dir)
                    .map_err(|e| {
                        discard_mask(&mask_path);
                        e
                    })?;
                Ok(FileOutcome::Written {
                    mask: mask_path,
                    companions,
                })
            }
            Encoded::Ungated(gray) => {
                OutputMask::Gray(gray).save(&mask_path)?;
                Ok(FileOutcome::Written {
                    mask: mask_path,
                    companions: 0,
                })
            }
            Encoded::Filtered => Ok(FileOutcome::Filtered),
        }
    }

    // Copy the paired raster (or the embedded image, if enabled) and the annotation itself
    fn copy_companions(
        &self,
        record: &AnnotationRecord,
        stem: &str,
        mask_name: &str,
        output_dir: &Path,
    ) -> Result<usize> {
        let json_path = &record.json_path;
        let mut copied = 0;

        match find_companion_raster(json_path, &self.config.raster_extensions) {
            Some(raster) => {
                let name = sanitized_file_name(&raster);
                if name == mask_name {
                    warn!(
                        "Not copying {}: it would overwrite the mask of the same name",
                        raster.display()
                    );
                } else {
                    copy_into(&raster, output_dir, &name)?;
                    copied += 1;
                }
            }
            None => match record.image.embedded.as_deref() {
                Some(bytes) if self.config.extract_embedded_image => {
                    let ext = infer_image_format(bytes).unwrap_or("png");
                    let name = format!("{}.{}", stem, ext);
                    if name == mask_name {
                        warn!(
                            "Not extracting the embedded image of {}: it would overwrite the mask",
                            json_path.display()
                        );
                    } else {
                        let dest = output_dir.join(&name);
                        fs::write(&dest, bytes).map_err(|e| MaskError::io(&dest, e))?;
                        copied += 1;
                    }
                }
                _ => debug!("No raster found next to {}", json_path.display()),
            },
        }

        copy_into(json_path, output_dir, &sanitized_file_name(json_path))?;
        Ok(copied + 1)
    }

    fn transition(&mut self, next: BatchState) {
        debug!("{}: {:?} -> {:?}", self.job.name, self.state, next);
        self.state = next;
    }

    fn log(&self, message: impl Into<String>) {
        self.sink.emit(JobEvent::Log(message.into()));
    }
}

fn sanitized_file_name(path: &Path) -> String {
    sanitize_filename::sanitize(
        path.file_name()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default(),
    )
}

// A mask without its companions is not a usable sample
fn discard_mask(mask_path: &Path) {
    if let Err(e) = fs::remove_file(mask_path) {
        warn!("Failed to remove {}: {}", mask_path.display(), e);
    }
}
