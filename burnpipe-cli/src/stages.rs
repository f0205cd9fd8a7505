//! Concrete stages used by the `image` command.
//!
//! ```text
//!   FileSource ──pipe──► ImageSink ──► <output>/burnpipe.img
//!   (one start per track)   (runs once, drains until EOF)
//! ```
//!
//! Both stages move bytes on a worker thread and report back through
//! `poll`, so the driver thread never blocks on I/O.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use burnpipe::job::{JobView, StageEvent, StageOps};
use burnpipe::task::CurrentAction;
use burnpipe::{BurnError, EngineResult, Track, TrackKind};
use tracing::debug;

/// Chunk size for both stages.
const CHUNK_SIZE: usize = 64 * 1024;

/// Back-off while a nonblocking pipe is full or empty.
const PIPE_BACKOFF: Duration = Duration::from_millis(2);

const SOURCE: &str = "file-source";
const SINK: &str = "image-sink";

fn join_worker<T>(stage: &str, worker: JoinHandle<io::Result<T>>) -> EngineResult<T> {
    worker
        .join()
        .map_err(|_| BurnError::stage(stage, "worker thread panicked"))?
        .map_err(|e| BurnError::stage(stage, e.to_string()))
}

// ============================================================================
// FileSource
// ============================================================================

/// First stage: streams the current track's source file into the pipe.
pub struct FileSource {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<io::Result<u64>>>,
}

impl FileSource {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl Default for FileSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StageOps for FileSource {
    fn name(&self) -> &str {
        SOURCE
    }

    fn start(&mut self, job: &JobView<'_>) -> EngineResult<StageEvent> {
        let track = job
            .current_track()
            .map_err(|e| BurnError::stage(SOURCE, format!("no current track: {e}")))?;
        let source = track
            .source()
            .ok_or_else(|| BurnError::stage(SOURCE, format!("track {} has no source", track.id())))?;
        let mut pipe = job
            .output()
            .map_err(|e| BurnError::stage(SOURCE, format!("no output: {e}")))?
            .try_clone_pipe()
            .map_err(|e| BurnError::resource("output pipe", e))?
            .ok_or_else(|| BurnError::stage(SOURCE, "output is not a pipe"))?;
        let mut file = File::open(&source).map_err(|e| BurnError::transfer(&source, e))?;

        debug!(track = track.id(), source = %source.display(), "streaming track");
        self.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        let worker = std::thread::Builder::new()
            .name("burnpipe-source".to_string())
            .spawn(move || {
                let mut buf = vec![0u8; CHUNK_SIZE];
                let mut sent = 0u64;
                loop {
                    let n = file.read(&mut buf)?;
                    if n == 0 {
                        return Ok(sent);
                    }
                    let mut chunk = &buf[..n];
                    while !chunk.is_empty() {
                        if stop.load(Ordering::SeqCst) {
                            return Err(io::Error::new(io::ErrorKind::Interrupted, "stopped"));
                        }
                        match pipe.write(chunk) {
                            Ok(written) => chunk = &chunk[written..],
                            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                                std::thread::sleep(PIPE_BACKOFF)
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    sent += n as u64;
                }
            })
            .map_err(|e| BurnError::resource("source worker", e))?;
        self.worker = Some(worker);
        Ok(StageEvent::Running)
    }

    fn poll(&mut self, _job: &JobView<'_>) -> EngineResult<StageEvent> {
        match self.worker.take() {
            Some(worker) if worker.is_finished() => {
                let sent = join_worker(SOURCE, worker)?;
                debug!(bytes = sent, "track streamed");
                Ok(StageEvent::Finished(None))
            }
            other => {
                self.worker = other;
                Ok(StageEvent::Running)
            }
        }
    }

    fn stop(&mut self, _job: &JobView<'_>) -> EngineResult<()> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            // Stopping mid-track is not an error of its own.
            let _ = worker.join();
        }
        Ok(())
    }
}

// ============================================================================
// ImageSink
// ============================================================================

/// Leader: appends everything arriving on its input pipe to the image file.
pub struct ImageSink {
    stop: Arc<AtomicBool>,
    written: Arc<AtomicU64>,
    output: Option<PathBuf>,
    worker: Option<JoinHandle<io::Result<u64>>>,
}

impl ImageSink {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            written: Arc::new(AtomicU64::new(0)),
            output: None,
            worker: None,
        }
    }

    /// Bytes written to the image so far.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

impl Default for ImageSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StageOps for ImageSink {
    fn name(&self) -> &str {
        SINK
    }

    fn start(&mut self, job: &JobView<'_>) -> EngineResult<StageEvent> {
        let mut pipe = job
            .input()
            .map_err(|e| BurnError::stage(SINK, format!("no input: {e}")))?
            .try_clone_pipe()
            .map_err(|e| BurnError::resource("input pipe", e))?
            .ok_or_else(|| BurnError::stage(SINK, "input is not a pipe"))?;
        let path = job
            .output_path()
            .map_err(|e| BurnError::stage(SINK, format!("no output path: {e}")))?
            .to_path_buf();
        let mut image = File::create(&path).map_err(|e| BurnError::transfer(&path, e))?;

        if let Ok(ctx) = job.ctx() {
            ctx.set_current_action(CurrentAction::CreatingImage, None, false);
            ctx.start_progress(false);
        }

        self.stop.store(false, Ordering::SeqCst);
        self.written.store(0, Ordering::Relaxed);
        self.output = Some(path);
        let stop = Arc::clone(&self.stop);
        let written = Arc::clone(&self.written);
        let worker = std::thread::Builder::new()
            .name("burnpipe-sink".to_string())
            .spawn(move || {
                let mut buf = vec![0u8; CHUNK_SIZE];
                loop {
                    if stop.load(Ordering::SeqCst) {
                        return Err(io::Error::new(io::ErrorKind::Interrupted, "stopped"));
                    }
                    match pipe.read(&mut buf) {
                        Ok(0) => {
                            image.flush()?;
                            return Ok(written.load(Ordering::Relaxed));
                        }
                        Ok(n) => {
                            image.write_all(&buf[..n])?;
                            written.fetch_add(n as u64, Ordering::Relaxed);
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            std::thread::sleep(PIPE_BACKOFF)
                        }
                        Err(e) => return Err(e),
                    }
                }
            })
            .map_err(|e| BurnError::resource("sink worker", e))?;
        self.worker = Some(worker);
        Ok(StageEvent::Running)
    }

    fn poll(&mut self, job: &JobView<'_>) -> EngineResult<StageEvent> {
        if let Ok(ctx) = job.ctx() {
            ctx.set_written_session(self.written());
        }

        match self.worker.take() {
            Some(worker) if worker.is_finished() => {
                let total = join_worker(SINK, worker)?;
                let path = self
                    .output
                    .take()
                    .ok_or_else(|| BurnError::stage(SINK, "finished without an output"))?;
                if let Ok(ctx) = job.ctx() {
                    ctx.set_written_session(total);
                }
                let track = Track::new(TrackKind::Image).with_bytes(total);
                track.set_output(&path);
                debug!(bytes = total, output = %path.display(), "image complete");
                Ok(StageEvent::Finished(Some(track)))
            }
            other => {
                self.worker = other;
                Ok(StageEvent::Running)
            }
        }
    }

    fn stop(&mut self, _job: &JobView<'_>) -> EngineResult<()> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burnpipe::job::{ChainDriver, JobChain, StopReason};
    use burnpipe::{LocalSession, Session, TaskAction, TaskContext};
    use tempfile::TempDir;

    fn source_tracks(temp: &TempDir, sizes: &[usize]) -> Vec<Track> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, size)| {
                let path = temp.path().join(format!("in-{i}.bin"));
                std::fs::write(&path, vec![i as u8 + 1; *size]).unwrap();
                Track::new(TrackKind::Data)
                    .with_source(path)
                    .with_bytes(*size as u64)
            })
            .collect()
    }

    fn image_chain() -> JobChain {
        let mut chain = JobChain::new();
        chain
            .append(Box::new(FileSource::new()), TrackKind::Data)
            .unwrap();
        chain
            .append(Box::new(ImageSink::new()), TrackKind::Image)
            .unwrap();
        chain
    }

    // ========================================================================
    // Chain runs
    // ========================================================================

    #[test]
    fn test_files_are_concatenated_into_image() {
        let temp = TempDir::new().unwrap();
        let sizes = [CHUNK_SIZE * 3 + 17, 10, 0, 4096];
        let tracks = source_tracks(&temp, &sizes);
        let image = temp.path().join("out.img");
        let session = Arc::new(
            LocalSession::new(temp.path().join("tmp"))
                .with_tracks(tracks)
                .with_image_output(&image),
        );
        let ctx = Arc::new(TaskContext::new(
            Arc::clone(&session) as Arc<dyn Session>,
            TaskAction::Normal,
        ));

        let completion = ChainDriver::new(image_chain(), Arc::clone(&ctx))
            .with_poll_interval(Duration::from_millis(2))
            .run();
        assert!(completion.is_ok(), "{completion:?}");

        let expected: usize = sizes.iter().sum();
        let data = std::fs::read(&image).unwrap();
        assert_eq!(data.len(), expected);
        assert_eq!(data[0], 1);
        assert_eq!(data[expected - 1], 4);

        let produced = session.tracks();
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].kind(), TrackKind::Image);
        assert_eq!(produced[0].size().bytes, expected as u64);
        assert_eq!(ctx.written(), expected as u64);
    }

    #[test]
    fn test_missing_source_fails_run() {
        let temp = TempDir::new().unwrap();
        let track = Track::new(TrackKind::Data).with_source(temp.path().join("missing.bin"));
        let session = Arc::new(
            LocalSession::new(temp.path().join("tmp"))
                .with_tracks(vec![track])
                .with_image_output(temp.path().join("out.img")),
        );
        let ctx = Arc::new(TaskContext::new(session, TaskAction::Normal));

        let completion = ChainDriver::new(image_chain(), ctx)
            .with_poll_interval(Duration::from_millis(2))
            .run();

        let failure = completion.unwrap_err();
        assert!(matches!(failure.error, BurnError::Transfer { .. }));
    }

    #[test]
    fn test_stop_joins_idle_sink() {
        let temp = TempDir::new().unwrap();
        let tracks = source_tracks(&temp, &[16]);
        let session = Arc::new(
            LocalSession::new(temp.path().join("tmp"))
                .with_tracks(tracks)
                .with_image_output(temp.path().join("out.img")),
        );
        let ctx = Arc::new(TaskContext::new(session, TaskAction::Normal));

        let mut chain = JobChain::new();
        let sink_only = chain.push(Box::new(Idle), TrackKind::Data);
        let sink = chain.push(Box::new(ImageSink::new()), TrackKind::Image);
        chain.connect(sink_only, sink).unwrap();
        chain.activate_all(&ctx);
        chain.start_all();

        // The upstream never closes its pipe, so only stop ends the worker.
        chain.stop_all(StopReason::Cancelled);
        assert!(chain.is_stopped());
    }

    struct Idle;

    impl StageOps for Idle {
        fn name(&self) -> &str {
            "idle"
        }

        fn start(&mut self, _job: &JobView<'_>) -> EngineResult<StageEvent> {
            Ok(StageEvent::Running)
        }
    }
}
