use clap::Parser;

use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use labelme2mask::utils::{create_progress_bar, remove_output_directory};
use labelme2mask::{
    log_event, Args, CancellationToken, ConversionJob, JobController, JobEvent, JobOutcome,
};

// How often the event loop looks at the interrupt flag while a file is being converted
const INTERRUPT_POLL: Duration = Duration::from_millis(200);

fn main() {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

// The first Ctrl-C stops the running job after its current file, the second one exits
fn listen_for_interrupt(interrupt: CancellationToken) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::Builder::new()
        .name("labelme2mask-interrupt".into())
        .spawn(move || {
            runtime.block_on(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    debug!("Cannot listen for Ctrl-C: {}", e);
                    return;
                }
                warn!("Interrupted, stopping after the current file (press Ctrl-C again to abort)");
                interrupt.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            })
        })?;
    Ok(())
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    if args.delete {
        for dir in &args.json_dirs {
            let dataset_dir = PathBuf::from(dir).join(&args.output_name);
            if remove_output_directory(&dataset_dir)? {
                info!("Deleted directory: {}", dataset_dir.display());
            } else {
                warn!("Directory not found: {}", dataset_dir.display());
            }
        }
        return Ok(());
    }

    let config = Arc::new(args.to_config()?);
    let interrupt = CancellationToken::new();
    listen_for_interrupt(interrupt.clone())?;
    let mut controller = JobController::new();
    let mut failed = 0;

    for dir in &args.json_dirs {
        if interrupt.is_cancelled() {
            warn!("Skipping {}: interrupted", dir);
            continue;
        }
        let dirname = PathBuf::from(dir);
        if !dirname.is_dir() {
            error!("The specified json_dir does not exist: {}", dir);
            failed += 1;
            continue;
        }

        info!("Starting the conversion process for {}...", dirname.display());
        let (tx, rx) = mpsc::channel();
        let job = ConversionJob::in_place(&dirname, &args.output_name);
        controller.start(job, Arc::clone(&config), tx)?;

        let pb = create_progress_bar(100, dir);
        // The channel closes when the worker drops its sender
        loop {
            match rx.recv_timeout(INTERRUPT_POLL) {
                Ok(JobEvent::Progress(percent)) => pb.set_position(u64::from(percent)),
                Ok(JobEvent::Runtime(seconds)) => pb.set_message(format!("{:.2} s", seconds)),
                Ok(other) => pb.suspend(|| log_event(&other)),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            controller.stop_on(&interrupt);
        }

        match controller.wait() {
            Some(JobOutcome::Completed(_)) => pb.finish_with_message("complete"),
            Some(JobOutcome::Cancelled(_)) => pb.abandon_with_message("stopped"),
            Some(JobOutcome::Failed(_)) | None => {
                pb.abandon_with_message("failed");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} directories failed", failed, args.json_dirs.len()).into());
    }
    Ok(())
}
