//! `burnpipe image`: concatenate files into one image through a pipeline.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use burnpipe::config::EngineConfig;
use burnpipe::job::{ChainDriver, JobChain};
use burnpipe::{BurnError, LocalSession, Session, TaskAction, TaskContext, Track, TrackKind};
use clap::Args;
use indicatif::ProgressBar;
use tracing::{info, info_span};

use super::common::{byte_progress_bar, display_path, format_duration, format_size};
use crate::error::CliError;
use crate::stages::{FileSource, ImageSink};

/// File name of the produced image inside the output directory.
pub const IMAGE_FILE_NAME: &str = "burnpipe.img";

/// Arguments for `image`.
#[derive(Debug, Args)]
pub struct ImageArgs {
    /// Input files, one track each, in order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Directory the image is written to
    #[arg(short, long)]
    pub output: PathBuf,

    /// Volume label recorded in the session
    #[arg(long)]
    pub label: Option<String>,
}

/// Build one data track per input file.
pub fn tracks_for(files: &[PathBuf]) -> Result<Vec<Track>, CliError> {
    files
        .iter()
        .map(|path| {
            let meta = std::fs::metadata(path).map_err(|e| BurnError::transfer(path, e))?;
            if !meta.is_file() {
                return Err(CliError::Config(format!(
                    "{} is not a regular file",
                    path.display()
                )));
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(Track::new(TrackKind::Data)
                .with_source(path)
                .with_bytes(meta.len())
                .with_label(name))
        })
        .collect()
}

pub fn run(args: ImageArgs, config: &EngineConfig) -> Result<(), CliError> {
    let tracks = tracks_for(&args.files)?;
    std::fs::create_dir_all(&args.output).map_err(|e| BurnError::transfer(&args.output, e))?;
    let image_path = image_path(&args.output);

    let mut session = LocalSession::new(&config.tmp_dir)
        .with_tracks(tracks.clone())
        .with_image_output(&image_path);
    if let Some(label) = args.label {
        session = session.with_label(label);
    }
    let session = Arc::new(session);

    let total: u64 = tracks.iter().map(|t| t.size().bytes).sum();
    let blocks: u64 = tracks.iter().map(|t| t.size().blocks).sum();
    let ctx = Arc::new(
        TaskContext::new(Arc::clone(&session) as Arc<dyn Session>, TaskAction::Normal)
            .with_span(info_span!("image", tracks = tracks.len())),
    );
    ctx.set_output_size_for_current_track(blocks, total);

    let mut chain = JobChain::new().with_span(info_span!("chain"));
    chain.append(Box::new(FileSource::new()), TrackKind::Data)?;
    chain.append(Box::new(ImageSink::new()), TrackKind::Image)?;

    let driver = ChainDriver::new(chain, Arc::clone(&ctx)).with_poll_interval(config.poll_interval);
    let handle = driver.handle();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, stopping pipeline...");
        handle.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    println!(
        "Imaging {} file(s), {} into {}",
        tracks.len(),
        format_size(total),
        display_path(&image_path)
    );
    info!(files = tracks.len(), bytes = total, "image run started");

    let bar = byte_progress_bar(total)?;
    let done = Arc::new(AtomicBool::new(false));
    let reporter = {
        let bar = bar.clone();
        let ctx = Arc::clone(&ctx);
        let done = Arc::clone(&done);
        std::thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                report(&bar, &ctx);
                std::thread::sleep(Duration::from_millis(200));
            }
        })
    };

    let completion = driver.run();
    done.store(true, Ordering::SeqCst);
    let _ = reporter.join();

    match completion {
        Ok(()) => {
            bar.finish_with_message("done");
            print_tracks(&session.tracks(), &ctx);
            Ok(())
        }
        Err(failure) => {
            bar.abandon_with_message(failure.result.to_string());
            Err(failure.into())
        }
    }
}

/// Refresh the bar from the context: position, action, rate and ETA.
fn report(bar: &ProgressBar, ctx: &TaskContext) {
    bar.set_position(ctx.written());

    let mut message = ctx.current_action_string();
    if let Ok(rate) = ctx.rate() {
        message.push_str(&format!(" {}/s", format_size(rate)));
    }
    if let Ok(remaining) = ctx.remaining_time() {
        message.push_str(&format!(" ETA {}", format_duration(remaining)));
    }
    bar.set_message(message);
}

fn print_tracks(tracks: &[Track], ctx: &TaskContext) {
    println!();
    println!("Produced {} track(s):", tracks.len());
    for track in tracks {
        let output = track
            .output()
            .map(|p| display_path(&p))
            .unwrap_or_else(|| "(no output)".to_string());
        println!(
            "  #{:<4} {:<6} {:>12}  {}",
            track.id(),
            track.kind().name(),
            format_size(track.size().bytes),
            output
        );
    }
    if let Ok(elapsed) = ctx.elapsed() {
        println!("Elapsed: {}", format_duration(elapsed));
    }
}

/// Image path for an output directory.
pub fn image_path(output: &Path) -> PathBuf {
    output.join(IMAGE_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tracks_for_files() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.bin");
        let b = temp.path().join("b.bin");
        std::fs::write(&a, vec![0u8; 100]).unwrap();
        std::fs::write(&b, vec![0u8; 5000]).unwrap();

        let tracks = tracks_for(&[a.clone(), b]).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].source(), Some(a));
        assert_eq!(tracks[0].label().as_deref(), Some("a.bin"));
        assert_eq!(tracks[1].size().bytes, 5000);
        assert_eq!(tracks[1].kind(), TrackKind::Data);
    }

    #[test]
    fn test_tracks_for_rejects_directories() {
        let temp = TempDir::new().unwrap();
        let err = tracks_for(&[temp.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_tracks_for_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = tracks_for(&[temp.path().join("missing")]).unwrap_err();
        assert!(matches!(err, CliError::Engine(BurnError::Transfer { .. })));
    }

    #[test]
    fn test_image_path() {
        assert_eq!(
            image_path(Path::new("/out")),
            PathBuf::from("/out/burnpipe.img")
        );
    }
}
