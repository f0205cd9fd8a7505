//! Integration tests for multi-track runs through a two-stage pipe chain.
//!
//! Run with: `cargo test --test multi_track`

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;

use burnpipe::job::{ChainDriver, JobChain, JobView, StageEvent, StageOps};
use burnpipe::{BurnResult, EngineResult, Session, TrackKind};

use common::{session_with_tracks, PipeSink, PipeSource};

// ============================================================================
// Helper Functions
// ============================================================================

/// Single-stage chain that finishes every track immediately with an image.
struct Imager {
    visits: Arc<Mutex<Vec<u64>>>,
}

impl StageOps for Imager {
    fn name(&self) -> &str {
        "imager"
    }

    fn start(&mut self, job: &JobView<'_>) -> EngineResult<StageEvent> {
        let track = job
            .current_track()
            .map_err(|e| burnpipe::BurnError::stage("imager", e.to_string()))?;
        self.visits.lock().push(track.id());
        let image = burnpipe::Track::new(TrackKind::Image).with_bytes(track.size().bytes);
        Ok(StageEvent::Finished(Some(image)))
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

#[test]
fn test_source_restarts_once_per_track() {
    let temp = TempDir::new().unwrap();
    let (session, ctx, tracks) = session_with_tracks(&temp, 3, 10_000);
    let starts = Arc::new(Mutex::new(Vec::new()));

    let mut chain = JobChain::new();
    chain.append(PipeSource::new(&starts), TrackKind::Data).unwrap();
    chain.append(PipeSink::new(), TrackKind::Image).unwrap();

    let completion = ChainDriver::new(chain, Arc::clone(&ctx))
        .with_poll_interval(Duration::from_millis(2))
        .run();
    assert!(completion.is_ok(), "{completion:?}");

    let expected: Vec<u64> = tracks.iter().map(|t| t.id()).collect();
    assert_eq!(*starts.lock(), expected);

    let produced = session.tracks();
    assert_eq!(produced.len(), 1);
    assert_eq!(produced[0].kind(), TrackKind::Image);
    assert_eq!(produced[0].size().bytes, 30_000);

    let output = produced[0].output().unwrap();
    assert_eq!(std::fs::metadata(output).unwrap().len(), 30_000);
    assert_eq!(ctx.written(), 30_000);
}

#[test]
fn test_single_stage_adds_one_track_per_visit() {
    let temp = TempDir::new().unwrap();
    let (session, ctx, tracks) = session_with_tracks(&temp, 4, 2048);
    let visits = Arc::new(Mutex::new(Vec::new()));

    let mut chain = JobChain::new();
    let id = chain.push(
        Box::new(Imager {
            visits: Arc::clone(&visits),
        }),
        TrackKind::Image,
    );
    chain.validate().unwrap();

    assert_eq!(chain.activate_all(&ctx), BurnResult::Ok);
    // The first start drives every track synchronously.
    assert_eq!(chain.start(id), BurnResult::Retry);

    assert!(ctx.is_completed());
    assert_eq!(visits.lock().len(), tracks.len());
    let produced = session.tracks();
    assert_eq!(produced.len(), tracks.len());
    assert!(produced.iter().all(|t| t.kind() == TrackKind::Image));
}

#[test]
fn test_failure_mid_run_restores_session_tracks() {
    let temp = TempDir::new().unwrap();
    let (session, ctx, tracks) = session_with_tracks(&temp, 3, 10);

    ctx.add_track(burnpipe::Track::new(TrackKind::Image));
    assert_eq!(session.tracks().len(), 1);

    let mut chain = JobChain::new();
    let id = chain.push(Box::new(common::Failing), TrackKind::Image);
    chain.activate(id, &ctx);
    assert_eq!(chain.start(id), BurnResult::Failed);

    let restored = session.tracks();
    assert_eq!(restored.len(), tracks.len());
    assert!(restored.iter().zip(&tracks).all(|(a, b)| a.ptr_eq(b)));
}

#[test]
fn test_next_track_sequence_from_context() {
    let temp = TempDir::new().unwrap();
    let (_session, ctx, tracks) = session_with_tracks(&temp, 5, 0);

    ctx.set_current_track(&tracks[3]).unwrap();
    let mut results = Vec::new();
    loop {
        let result = ctx.next_track();
        results.push(result);
        if result == BurnResult::Ok {
            break;
        }
    }

    assert_eq!(results.len(), tracks.len());
    assert!(results[..4].iter().all(|r| *r == BurnResult::Retry));
}
