//! Integration tests for chain wiring, teardown and the error protocol.
//!
//! Run with: `cargo test --test chain_lifecycle`

mod common;

use std::io::{Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use burnpipe::job::{is_nonblocking, JobChain, StageState, StopReason};
use burnpipe::{BurnError, BurnResult, Completion, TrackKind};

use common::{session_with_tracks, Failing, Idle};

// ============================================================================
// Helper Functions
// ============================================================================

const NAMES: [&str; 5] = ["s0", "s1", "s2", "s3", "s4"];

fn idle_chain(n: usize) -> JobChain {
    let mut chain = JobChain::new();
    for name in NAMES.iter().take(n) {
        chain.append(Box::new(Idle(*name)), TrackKind::Image).unwrap();
    }
    chain
}

fn record_completions(ctx: &burnpipe::TaskContext) -> Arc<Mutex<Vec<Completion>>> {
    let calls: Arc<Mutex<Vec<Completion>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    ctx.on_completion(Box::new(move |c| sink.lock().push(c)));
    calls
}

// ============================================================================
// Channel wiring
// ============================================================================

#[test]
fn test_activation_wires_matching_pipe_pairs() {
    for n in 1..=NAMES.len() {
        let temp = TempDir::new().unwrap();
        let (_session, ctx, _) = session_with_tracks(&temp, 1, 0);
        let mut chain = idle_chain(n);
        chain.validate().unwrap();

        assert_eq!(chain.activate_all(&ctx), BurnResult::Ok);

        let order = chain.order();
        for pair in order.windows(2) {
            let (up, down) = (pair[0], pair[1]);
            let mut writer = chain.output(up).unwrap().pipe().unwrap().try_clone().unwrap();
            let mut reader = chain.input(down).unwrap().pipe().unwrap().try_clone().unwrap();
            assert!(is_nonblocking(&writer).unwrap());
            assert!(is_nonblocking(&reader).unwrap());

            writer.write_all(&[up.index() as u8]).unwrap();
            let mut byte = [0u8; 1];
            reader.read_exact(&mut byte).unwrap();
            assert_eq!(byte[0], up.index() as u8);
        }

        let head = order[0];
        assert!(chain.input(head).is_none());
        let leader = *order.last().unwrap();
        assert!(chain.output(leader).unwrap().path().is_some());
        for id in &order {
            assert_eq!(chain.state(*id), StageState::Activated);
        }
    }
}

#[test]
fn test_stop_twice_is_noop() {
    let temp = TempDir::new().unwrap();
    let (_session, ctx, _) = session_with_tracks(&temp, 1, 0);
    let mut chain = idle_chain(3);
    chain.activate_all(&ctx);
    chain.start_all();

    chain.stop_all(StopReason::Ok);
    chain.stop_all(StopReason::Error);

    for id in chain.order() {
        assert_eq!(chain.state(id), StageState::Stopped(StopReason::Ok));
        assert!(chain.input(id).is_none());
        assert!(chain.output(id).is_none());
        assert!(chain.ctx(id).is_none());
    }
    assert!(chain.is_stopped());
}

#[test]
fn test_stop_without_activation() {
    let mut chain = idle_chain(2);
    chain.stop_all(StopReason::Cancelled);
    assert!(chain.is_stopped());
}

// ============================================================================
// Error protocol
// ============================================================================

#[test]
fn test_stage_error_completes_once_with_same_kind() {
    let temp = TempDir::new().unwrap();
    let (_session, ctx, _) = session_with_tracks(&temp, 1, 0);
    let calls = record_completions(&ctx);

    let mut chain = JobChain::new();
    chain.append(Box::new(Idle("reader")), TrackKind::Image).unwrap();
    chain.append(Box::new(Failing), TrackKind::Image).unwrap();
    chain.activate_all(&ctx);

    assert_eq!(chain.start_all(), BurnResult::Failed);
    chain.stop_all(StopReason::Error);

    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        Err(failure) => {
            assert_eq!(failure.result, BurnResult::Failed);
            assert!(matches!(failure.error, BurnError::Stage { ref stage, .. } if stage == "failing"));
        }
        Ok(()) => panic!("expected a failure"),
    }
}

#[test]
fn test_cancellation_error_keeps_cancelled_code() {
    let temp = TempDir::new().unwrap();
    let (_session, ctx, _) = session_with_tracks(&temp, 1, 0);
    let calls = record_completions(&ctx);

    let mut chain = idle_chain(1);
    let id = chain.head().unwrap();
    chain.activate(id, &ctx);

    assert_eq!(chain.error(id, BurnError::Cancelled), BurnResult::Cancelled);
    let calls = calls.lock();
    assert!(matches!(&calls[0], Err(f) if f.result == BurnResult::Cancelled && f.error.is_cancelled()));
}

#[test]
fn test_remap_observer_requests_fallback() {
    let temp = TempDir::new().unwrap();
    let (_session, ctx, _) = session_with_tracks(&temp, 1, 0);
    let calls = record_completions(&ctx);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut chain = JobChain::new();
    {
        let seen = Arc::clone(&seen);
        chain.set_error_remap(Box::new(move |result, err| {
            seen.lock().push((result, err.to_string()));
            BurnResult::Fallback
        }));
    }
    chain.append(Box::new(Failing), TrackKind::Image).unwrap();
    chain.activate_all(&ctx);

    assert_eq!(chain.start_all(), BurnResult::Fallback);
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(seen.lock()[0].0, BurnResult::Failed);
    assert!(matches!(&calls.lock()[0], Err(f) if f.result == BurnResult::Fallback));
}

#[test]
fn test_error_after_finish_is_ignored() {
    let temp = TempDir::new().unwrap();
    let (_session, ctx, _) = session_with_tracks(&temp, 1, 0);
    let calls = record_completions(&ctx);

    let mut chain = idle_chain(1);
    let id = chain.head().unwrap();
    chain.activate(id, &ctx);
    chain.start(id);

    assert_eq!(chain.finished(id, None).unwrap(), BurnResult::Ok);
    chain.error(id, BurnError::stage("s0", "late failure"));

    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].is_ok());
}
