//! `burnpipe fetch`: copy a source onto local storage.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use burnpipe::config::EngineConfig;
use burnpipe::{Xfer, XferOutcome};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::common::{byte_progress_bar, display_path, format_size};
use crate::error::CliError;

/// Arguments for `fetch`.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Source path or file:// URI (file or directory)
    pub src: String,

    /// Destination path
    pub dest: PathBuf,
}

pub fn run(args: FetchArgs, config: &EngineConfig) -> Result<(), CliError> {
    let xfer = Xfer::new().with_buffer_size(config.copy_buffer_size);
    let cancel = CancellationToken::new();

    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, cancelling transfer...");
        handler_token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let bar = byte_progress_bar(0)?;
    let progress = xfer.progress_handle();
    let done = Arc::new(AtomicBool::new(false));
    let reporter = {
        let bar = bar.clone();
        let done = Arc::clone(&done);
        std::thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                let (copied, total) = progress.snapshot();
                bar.set_length(total);
                bar.set_position(copied);
                std::thread::sleep(Duration::from_millis(100));
            }
        })
    };

    info!(src = %args.src, dest = %args.dest.display(), "fetch started");
    let result = xfer.run_blocking(&args.src, &args.dest, &cancel);
    done.store(true, Ordering::SeqCst);
    let _ = reporter.join();

    let (copied, total) = xfer.progress();
    bar.set_length(total);
    bar.set_position(copied);

    match result? {
        XferOutcome::Completed => {
            bar.finish_with_message("done");
            println!(
                "Copied {} to {}",
                format_size(copied),
                display_path(&args.dest)
            );
            Ok(())
        }
        XferOutcome::Cancelled => {
            bar.abandon_with_message("cancelled");
            println!(
                "Cancelled after {} of {}",
                format_size(copied),
                format_size(total)
            );
            Err(CliError::Cancelled)
        }
    }
}
