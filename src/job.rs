//! Background execution of conversion jobs.

use log::{debug, error, info};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::ConversionConfig;
use crate::converter::{BatchConverter, JobOutcome};
use crate::error::{MaskError, Result};
use crate::progress::{CancellationToken, ProgressSink};
use crate::types::ConversionJob;

struct ActiveJob {
    name: String,
    token: CancellationToken,
    handle: JoinHandle<JobOutcome>,
}

/// Owns the worker thread of the current job. At most one job runs at a time: starting a new
/// one stops and joins the previous worker first.
#[derive(Default)]
pub struct JobController {
    active: Option<ActiveJob>,
}

impl JobController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `job` on a background thread, reporting to `sink`.
    pub fn start<S>(
        &mut self,
        job: ConversionJob,
        config: Arc<ConversionConfig>,
        sink: S,
    ) -> Result<CancellationToken>
    where
        S: ProgressSink + 'static,
    {
        if let Some(previous) = &self.active {
            info!("Stopping {} before starting a new job", previous.name);
            self.stop_and_wait();
        }

        let token = CancellationToken::new();
        let worker_token = token.clone();
        let name = job.name.clone();
        let input_dir = job.input_dir.clone();

        let handle = std::thread::Builder::new()
            .name("labelme2mask-worker".into())
            .spawn(move || {
                let outcome = BatchConverter::new(job, config, worker_token, sink).run();
                debug!("Closing worker thread");
                outcome
            })
            .map_err(|e| MaskError::io(input_dir, e))?;

        self.active = Some(ActiveJob {
            name,
            token: token.clone(),
            handle,
        });
        Ok(token)
    }

    /// Ask the running job to stop after the file it is working on.
    pub fn request_stop(&self) {
        if let Some(active) = &self.active {
            active.token.cancel();
        }
    }

    /// Forward `interrupt` to the running job. Returns whether a stop was requested.
    pub fn stop_on(&self, interrupt: &CancellationToken) -> bool {
        if !interrupt.is_cancelled() || self.active.is_none() {
            return false;
        }
        self.request_stop();
        true
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Block until the current job ends. `None` if no job was started.
    pub fn wait(&mut self) -> Option<JobOutcome> {
        let active = self.active.take()?;
        Some(match active.handle.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                let message = format!("{} worker panicked", active.name);
                error!("{}", message);
                JobOutcome::Failed(message)
            }
        })
    }

    pub fn stop_and_wait(&mut self) -> Option<JobOutcome> {
        self.request_stop();
        self.wait()
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        self.stop_and_wait();
    }
}
