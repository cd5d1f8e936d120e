//! The channel between a running conversion and whoever started it: progress, timing and log
//! events flow out, a cancellation request flows in.

use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Something a conversion job reports to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// Percentage of files processed, 0 to 100
    Progress(u8),
    /// Seconds elapsed since the job started
    Runtime(f64),
    Log(String),
    Error(String),
    /// Every file was visited
    Finished { job_name: String, seconds: f64 },
    /// The job stopped early on request
    Cancelled {
        job_name: String,
        processed: usize,
        total: usize,
        seconds: f64,
    },
}

/// Receiver of job events. Events arrive from the worker thread in processing order.
pub trait ProgressSink: Send {
    fn emit(&self, event: JobEvent);
}

impl ProgressSink for Sender<JobEvent> {
    fn emit(&self, event: JobEvent) {
        if self.send(event).is_err() {
            debug!("Progress receiver dropped; event discarded");
        }
    }
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: JobEvent) {
        log_event(&event);
    }
}

/// Adapts a closure into a sink, for callers that react to events in place.
pub struct FnSink<F>(pub F);

impl<F> ProgressSink for FnSink<F>
where
    F: Fn(JobEvent) + Send,
{
    fn emit(&self, event: JobEvent) {
        (self.0)(event)
    }
}

/// Write one event through the `log` facade at a level matching its kind.
pub fn log_event(event: &JobEvent) {
    match event {
        JobEvent::Progress(percent) => debug!("Progress: {}%", percent),
        JobEvent::Runtime(seconds) => debug!("Runtime: {:.2} s", seconds),
        JobEvent::Log(message) => info!("{}", message),
        JobEvent::Error(message) => error!("{}", message),
        JobEvent::Finished { job_name, seconds } => {
            info!("{} finished in {:.2} seconds", job_name, seconds)
        }
        JobEvent::Cancelled {
            job_name,
            processed,
            total,
            seconds,
        } => warn!(
            "{} stopped after {} of {} files ({:.2} seconds)",
            job_name, processed, total, seconds
        ),
    }
}

/// Cooperative stop flag shared between a controller and its worker.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// `round((done / total) * 100)` without going through floating point.
pub fn percent_complete(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let done = done.min(total) as u64;
    let total = total as u64;
    ((done * 200 + total) / (total * 2)) as u8
}
