//! Progress, timing and multi-track state for one run of a pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn, Span};

use super::action::{CurrentAction, TaskAction};
use super::rate::RateEstimator;
use crate::error::{BurnError, BurnResult, Completion, Failure, Unavailable};
use crate::session::Session;
use crate::track::Track;

/// Callback fired exactly once when a run ends.
pub type CompletionCallback = Box<dyn FnOnce(Completion) + Send>;

struct State {
    fake: bool,
    tracks: Vec<Track>,
    current: Option<usize>,
    /// Snapshot entries not visited yet, counted from the starting track.
    unvisited: usize,
    /// Whether this run saved the session's track list before adding to it.
    pushed: bool,
    session_written: u64,
    track_written: u64,
    total_blocks: u64,
    total_bytes: u64,
    progress: Option<f64>,
    explicit_rate: Option<u64>,
    use_average: bool,
    rate: RateEstimator,
    dangerous: u32,
    action: CurrentAction,
    action_label: Option<String>,
    completion: Option<CompletionCallback>,
    finalised: bool,
}

impl State {
    fn new(tracks: Vec<Track>) -> Self {
        let mut state = Self {
            fake: false,
            tracks: Vec::new(),
            current: None,
            unvisited: 0,
            pushed: false,
            session_written: 0,
            track_written: 0,
            total_blocks: 0,
            total_bytes: 0,
            progress: None,
            explicit_rate: None,
            use_average: false,
            rate: RateEstimator::new(),
            dangerous: 0,
            action: CurrentAction::None,
            action_label: None,
            completion: None,
            finalised: false,
        };
        state.snapshot(tracks);
        state
    }

    fn snapshot(&mut self, tracks: Vec<Track>) {
        self.current = if tracks.is_empty() { None } else { Some(0) };
        self.unvisited = tracks.len().saturating_sub(1);
        self.tracks = tracks;
    }

    fn written(&self) -> u64 {
        self.session_written + self.track_written
    }

    fn byte_fraction(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        Some((self.written() as f64 / self.total_bytes as f64).min(1.0))
    }

    fn after_write(&mut self, now: Instant) {
        let written = self.written();
        self.rate.record_written(written, now);
        if self.progress.is_none() {
            if let Some(fraction) = self.byte_fraction() {
                self.rate.record_progress(fraction, now);
            }
        }
    }
}

/// Shared progress/timing/track-iteration state for one run.
///
/// All mutable state sits behind a single mutex: the control thread
/// advances it while a UI thread reads progress. Share it as
/// `Arc<TaskContext>`.
///
/// # Example
///
/// ```ignore
/// let ctx = Arc::new(TaskContext::new(session, TaskAction::Normal));
/// ctx.on_completion(Box::new(|result| println!("done: {:?}", result.is_ok())));
/// ctx.start_progress(false);
/// ctx.set_output_size_for_current_track(100, 204_800);
/// ctx.set_written(102_400);
/// assert_eq!(ctx.progress(), Ok(0.5));
/// ```
pub struct TaskContext {
    session: Arc<dyn Session>,
    action: TaskAction,
    span: Span,
    state: Mutex<State>,
}

impl TaskContext {
    /// Create a context bound to `session`, snapshotting its track list.
    pub fn new(session: Arc<dyn Session>, action: TaskAction) -> Self {
        let tracks = session.tracks();
        Self {
            session,
            action,
            span: Span::none(),
            state: Mutex::new(State::new(tracks)),
        }
    }

    /// Builder: span every lifecycle log of this context is emitted in.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Install the completion callback, replacing any previous one.
    pub fn on_completion(&self, callback: CompletionCallback) {
        self.state.lock().completion = Some(callback);
    }

    /// Start a new run: re-snapshot the session's tracks and clear counters.
    ///
    /// The completion callback is kept if it has not fired yet.
    pub fn reset(&self) {
        let tracks = self.session.tracks();
        let mut state = self.state.lock();
        let completion = state.completion.take();
        let fake = state.fake;
        *state = State::new(tracks);
        state.completion = completion;
        state.fake = fake;
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn action(&self) -> TaskAction {
        self.action
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Mark the run as a size-estimation pass.
    pub fn set_fake(&self, fake: bool) {
        self.state.lock().fake = fake;
    }

    pub fn is_fake(&self) -> bool {
        self.state.lock().fake
    }

    // ------------------------------------------------------------------
    // Tracks
    // ------------------------------------------------------------------

    /// Track snapshot taken at construction or the last reset.
    pub fn tracks(&self) -> Vec<Track> {
        self.state.lock().tracks.clone()
    }

    pub fn current_track(&self) -> Option<Track> {
        let state = self.state.lock();
        state.current.map(|i| state.tracks[i].clone())
    }

    /// Index of the current track in the snapshot.
    pub fn current_track_index(&self) -> Option<usize> {
        self.state.lock().current
    }

    /// Move the cursor to `track`, which must be part of the snapshot.
    ///
    /// Iteration then visits every snapshot entry once, starting here.
    pub fn set_current_track(&self, track: &Track) -> Result<(), Unavailable> {
        let mut state = self.state.lock();
        let index = state
            .tracks
            .iter()
            .position(|t| t.ptr_eq(track))
            .ok_or(Unavailable::NotApplicable)?;
        state.current = Some(index);
        state.unvisited = state.tracks.len() - 1;
        Ok(())
    }

    /// Optimistically add a produced track to the session.
    ///
    /// The first addition of a run saves the session's track list so a
    /// failure can restore it.
    pub fn add_track(&self, track: Track) {
        let mut state = self.state.lock();
        if !state.pushed {
            self.session.push_tracks();
            state.pushed = true;
        }
        let _enter = self.span.enter();
        debug!(track = track.id(), kind = %track.kind(), "adding track to session");
        self.session.add_track(track);
    }

    /// Advance the cursor to the next track.
    ///
    /// Returns [`BurnResult::Retry`] when a track remains to be processed,
    /// [`BurnResult::Ok`] when every track has been visited.
    pub fn next_track(&self) -> BurnResult {
        let mut state = self.state.lock();
        let Some(current) = state.current else {
            return BurnResult::Ok;
        };
        if state.unvisited == 0 {
            return BurnResult::Ok;
        }

        let next = (current + 1) % state.tracks.len();
        state.current = Some(next);
        state.unvisited -= 1;
        state.session_written += state.track_written;
        state.track_written = 0;
        state.progress = None;
        state.rate.clear_history();

        let _enter = self.span.enter();
        debug!(
            index = next,
            remaining = state.unvisited,
            "advancing to next track"
        );
        BurnResult::Retry
    }

    // ------------------------------------------------------------------
    // Counters
    // ------------------------------------------------------------------

    /// Bytes written for the current track.
    ///
    /// The counter never decreases within a track; a smaller value is
    /// ignored.
    pub fn set_written(&self, written: u64) {
        let mut state = self.state.lock();
        state.track_written = state.track_written.max(written);
        state.after_write(Instant::now());
    }

    /// Bytes written for the whole session.
    ///
    /// Non-decreasing like [`TaskContext::set_written`].
    pub fn set_written_session(&self, written: u64) {
        let mut state = self.state.lock();
        let track_written = written.saturating_sub(state.session_written);
        state.track_written = state.track_written.max(track_written);
        state.after_write(Instant::now());
    }

    /// Add to the bytes written for the current track.
    pub fn increment_written(&self, bytes: u64) {
        let mut state = self.state.lock();
        state.track_written = state.track_written.saturating_add(bytes);
        state.after_write(Instant::now());
    }

    /// Bytes written for the whole session.
    pub fn written(&self) -> u64 {
        self.state.lock().written()
    }

    /// Bytes written for the current track.
    pub fn written_track(&self) -> u64 {
        self.state.lock().track_written
    }

    /// Add the current track's output size to the session total.
    pub fn set_output_size_for_current_track(&self, blocks: u64, bytes: u64) {
        let mut state = self.state.lock();
        state.total_blocks += blocks;
        state.total_bytes += bytes;
    }

    /// Total output size of the session as `(blocks, bytes)`.
    pub fn session_output_size(&self) -> Result<(u64, u64), Unavailable> {
        let state = self.state.lock();
        if state.total_blocks == 0 && state.total_bytes == 0 {
            return Err(Unavailable::NotReady);
        }
        Ok((state.total_blocks, state.total_bytes))
    }

    /// Set the progress fraction explicitly; it overrides the byte ratio.
    pub fn set_progress(&self, fraction: f64) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mut state = self.state.lock();
        state.progress = Some(fraction);
        state.rate.record_progress(fraction, Instant::now());
    }

    /// Progress in `[0, 1]`.
    ///
    /// The explicit fraction wins; otherwise written/total, which is
    /// [`Unavailable::NotReady`] while the total is unknown.
    pub fn progress(&self) -> Result<f64, Unavailable> {
        let state = self.state.lock();
        if let Some(progress) = state.progress {
            return Ok(progress);
        }
        state.byte_fraction().ok_or(Unavailable::NotReady)
    }

    // ------------------------------------------------------------------
    // Timing
    // ------------------------------------------------------------------

    /// Start the progress timer if it is not running, or restart it when
    /// `force` is set. The current written count becomes the baseline.
    pub fn start_progress(&self, force: bool) {
        let mut state = self.state.lock();
        if force || !state.rate.is_started() {
            let written = state.written();
            state.rate.start(written, Instant::now());
        }
    }

    /// Stop the timer and drop progress, rate and ETA state.
    pub fn reset_progress(&self) {
        let mut state = self.state.lock();
        state.progress = None;
        state.explicit_rate = None;
        state.rate.reset();
    }

    /// Rate reported by the stage itself, in bytes/s.
    pub fn set_rate(&self, bytes_per_sec: u64) {
        self.state.lock().explicit_rate = Some(bytes_per_sec);
    }

    /// Report the average rate since start instead of the immediate one.
    pub fn set_use_average(&self, use_average: bool) {
        self.state.lock().use_average = use_average;
    }

    /// Write rate in bytes/s.
    pub fn rate(&self) -> Result<u64, Unavailable> {
        let state = self.state.lock();
        if let Some(rate) = state.explicit_rate {
            return Ok(rate);
        }
        if !state.rate.is_started() {
            return Err(Unavailable::NotRunning);
        }
        let rate = if state.use_average {
            state.rate.average_rate(state.written(), Instant::now())
        } else {
            state.rate.immediate_rate()
        };
        rate.map(|r| r as u64).ok_or(Unavailable::NotReady)
    }

    /// Time since the progress timer started.
    pub fn elapsed(&self) -> Result<Duration, Unavailable> {
        self.state
            .lock()
            .rate
            .elapsed(Instant::now())
            .ok_or(Unavailable::NotRunning)
    }

    /// Smoothed remaining time.
    pub fn remaining_time(&self) -> Result<Duration, Unavailable> {
        let state = self.state.lock();
        if !state.rate.is_started() {
            return Err(Unavailable::NotRunning);
        }
        state
            .rate
            .remaining(Instant::now())
            .ok_or(Unavailable::NotReady)
    }

    // ------------------------------------------------------------------
    // Action label and dangerous sections
    // ------------------------------------------------------------------

    /// Set what the run is doing now.
    ///
    /// Setting the same action again is ignored unless `force` is set,
    /// which also replaces the label.
    pub fn set_current_action(&self, action: CurrentAction, label: Option<&str>, force: bool) {
        let mut state = self.state.lock();
        if !force && state.action == action {
            return;
        }
        state.action = action;
        state.action_label = label.map(str::to_string);
    }

    pub fn current_action(&self) -> CurrentAction {
        self.state.lock().action
    }

    /// Label for the current action, falling back to its default text.
    pub fn current_action_string(&self) -> String {
        let state = self.state.lock();
        state
            .action_label
            .clone()
            .unwrap_or_else(|| state.action.label().to_string())
    }

    /// Enter (`true`) or leave (`false`) a section that must not be
    /// interrupted. Sections nest; leaving more often than entering is a
    /// no-op.
    pub fn set_dangerous(&self, dangerous: bool) {
        let mut state = self.state.lock();
        if dangerous {
            state.dangerous += 1;
        } else {
            state.dangerous = state.dangerous.saturating_sub(1);
        }
    }

    pub fn is_dangerous(&self) -> bool {
        self.state.lock().dangerous > 0
    }

    // ------------------------------------------------------------------
    // Finalisation
    // ------------------------------------------------------------------

    /// True once `finished` or `error` has run.
    pub fn is_completed(&self) -> bool {
        self.state.lock().finalised
    }

    /// End the run with a failure.
    ///
    /// Restores the session's track list if this run added to it, then
    /// fires the completion callback. A second finalisation is ignored and
    /// returns [`Unavailable::NotRunning`].
    pub fn error(&self, result: BurnResult, err: BurnError) -> Result<(), Unavailable> {
        let _enter = self.span.enter();
        let callback = {
            let mut state = self.state.lock();
            if state.finalised {
                warn!(error = %err, "run already finalised, ignoring error");
                return Err(Unavailable::NotRunning);
            }
            state.finalised = true;
            if state.pushed {
                self.session.pop_tracks();
                state.pushed = false;
            }
            state.completion.take()
        };

        let result = if result.is_success() {
            BurnResult::Failed
        } else {
            result
        };
        error!(%result, error = %err, "run failed");

        if let Some(callback) = callback {
            callback(Err(Failure { result, error: err }));
        }
        Ok(())
    }

    /// End the run successfully.
    ///
    /// `track`, if any, is appended to the session. Tracks added during the
    /// run are kept. A second finalisation is ignored and returns
    /// [`Unavailable::NotRunning`].
    pub fn finished(&self, track: Option<Track>) -> Result<(), Unavailable> {
        let _enter = self.span.enter();
        let callback = {
            let mut state = self.state.lock();
            if state.finalised {
                warn!("run already finalised, ignoring finish");
                return Err(Unavailable::NotRunning);
            }
            state.finalised = true;
            if let Some(track) = track {
                if !state.pushed {
                    self.session.push_tracks();
                }
                debug!(track = track.id(), kind = %track.kind(), "adding final track to session");
                self.session.add_track(track);
            }
            state.pushed = false;
            state.action = CurrentAction::Finished;
            state.action_label = None;
            state.completion.take()
        };

        info!("run finished");
        if let Some(callback) = callback {
            callback(Ok(()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TaskContext")
            .field("action", &self.action)
            .field("tracks", &state.tracks.len())
            .field("current", &state.current)
            .field("written", &state.written())
            .field("total_bytes", &state.total_bytes)
            .field("finalised", &state.finalised)
            .finish_non_exhaustive()
    }
}
