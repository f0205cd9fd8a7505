//! Scripted stages shared by the integration tests.

#![allow(dead_code)]

use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;

use burnpipe::error::EngineResult;
use burnpipe::job::{JobView, StageEvent, StageOps};
use burnpipe::{BurnError, LocalSession, Session, TaskAction, TaskContext, Track, TrackKind};

/// Session plus context over `count` tracks of `bytes_per_track` bytes.
pub fn session_with_tracks(
    temp: &TempDir,
    count: usize,
    bytes_per_track: u64,
) -> (Arc<LocalSession>, Arc<TaskContext>, Vec<Track>) {
    let tracks: Vec<Track> = (0..count)
        .map(|i| {
            Track::new(TrackKind::Data)
                .with_bytes(bytes_per_track)
                .with_label(format!("track-{i}"))
        })
        .collect();
    let session = Arc::new(LocalSession::new(temp.path()).with_tracks(tracks.clone()));
    let dyn_session: Arc<dyn Session> = Arc::clone(&session) as Arc<dyn Session>;
    let ctx = Arc::new(TaskContext::new(dyn_session, TaskAction::Normal));
    (session, ctx, tracks)
}

fn write_all_nonblocking(file: &mut File, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        match file.write(data) {
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(1))
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn read_to_end_nonblocking(file: &mut File) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match file.read(&mut buf) {
            Ok(0) => return Ok(out),
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(1))
            }
            Err(e) => return Err(e),
        }
    }
}

/// First stage: writes the current track's size in bytes into its pipe.
pub struct PipeSource {
    pub starts: Arc<Mutex<Vec<u64>>>,
    worker: Option<JoinHandle<io::Result<()>>>,
}

impl PipeSource {
    pub fn new(starts: &Arc<Mutex<Vec<u64>>>) -> Box<Self> {
        Box::new(Self {
            starts: Arc::clone(starts),
            worker: None,
        })
    }
}

impl StageOps for PipeSource {
    fn name(&self) -> &str {
        "pipe-source"
    }

    fn start(&mut self, job: &JobView<'_>) -> EngineResult<StageEvent> {
        let track = job
            .current_track()
            .map_err(|e| BurnError::stage("pipe-source", e.to_string()))?;
        self.starts.lock().push(track.id());

        let mut pipe = job
            .output()
            .ok()
            .and_then(|o| o.try_clone_pipe().transpose())
            .transpose()
            .map_err(|e| BurnError::resource("pipe", e))?
            .ok_or_else(|| BurnError::stage("pipe-source", "no output pipe"))?;

        let data = vec![b'x'; track.size().bytes as usize];
        self.worker = Some(std::thread::spawn(move || {
            write_all_nonblocking(&mut pipe, &data)
        }));
        Ok(StageEvent::Running)
    }

    fn poll(&mut self, _job: &JobView<'_>) -> EngineResult<StageEvent> {
        match &self.worker {
            Some(worker) if worker.is_finished() => Ok(StageEvent::Finished(None)),
            _ => Ok(StageEvent::Running),
        }
    }

    fn stop(&mut self, _job: &JobView<'_>) -> EngineResult<()> {
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| BurnError::stage("pipe-source", "worker panicked"))?
                .map_err(|e| BurnError::stage("pipe-source", e.to_string()))?;
        }
        Ok(())
    }
}

/// Leader: drains its input pipe into its output path.
pub struct PipeSink {
    worker: Option<JoinHandle<io::Result<u64>>>,
}

impl PipeSink {
    pub fn new() -> Box<Self> {
        Box::new(Self { worker: None })
    }
}

impl StageOps for PipeSink {
    fn name(&self) -> &str {
        "pipe-sink"
    }

    fn start(&mut self, job: &JobView<'_>) -> EngineResult<StageEvent> {
        let mut pipe = job
            .input()
            .ok()
            .and_then(|i| i.try_clone_pipe().transpose())
            .transpose()
            .map_err(|e| BurnError::resource("pipe", e))?
            .ok_or_else(|| BurnError::stage("pipe-sink", "no input pipe"))?;
        let path = job
            .output_path()
            .map_err(|e| BurnError::stage("pipe-sink", e.to_string()))?
            .to_path_buf();

        self.worker = Some(std::thread::spawn(move || {
            let data = read_to_end_nonblocking(&mut pipe)?;
            std::fs::write(&path, &data)?;
            Ok(data.len() as u64)
        }));
        Ok(StageEvent::Running)
    }

    fn poll(&mut self, job: &JobView<'_>) -> EngineResult<StageEvent> {
        match self.worker.take() {
            Some(worker) if worker.is_finished() => {
                let written = worker
                    .join()
                    .map_err(|_| BurnError::stage("pipe-sink", "worker panicked"))?
                    .map_err(|e| BurnError::stage("pipe-sink", e.to_string()))?;
                let path = job
                    .output_path()
                    .map_err(|e| BurnError::stage("pipe-sink", e.to_string()))?;
                if let Ok(ctx) = job.ctx() {
                    ctx.set_written_session(written);
                }
                let image = Track::new(TrackKind::Image).with_bytes(written);
                image.set_output(path);
                Ok(StageEvent::Finished(Some(image)))
            }
            other => {
                self.worker = other;
                Ok(StageEvent::Running)
            }
        }
    }
}

/// Stage that fails from `start` with a stage error.
pub struct Failing;

impl StageOps for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn start(&mut self, _job: &JobView<'_>) -> EngineResult<StageEvent> {
        Err(BurnError::stage("failing", "device went away"))
    }
}

/// Stage that does nothing until stopped.
pub struct Idle(pub &'static str);

impl StageOps for Idle {
    fn name(&self) -> &str {
        self.0
    }

    fn start(&mut self, _job: &JobView<'_>) -> EngineResult<StageEvent> {
        Ok(StageEvent::Running)
    }
}
