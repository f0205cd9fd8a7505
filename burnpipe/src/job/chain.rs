//! The job chain: an arena of linked stages and their lifecycle.
//!
//! # Architecture
//!
//! ```text
//!   head                                              leader
//! ┌────────┐  pipe / tmp file  ┌────────┐  pipe  ┌──────────────┐
//! │ stage0 │ ────────────────► │ stage1 │ ─────► │    stage2    │──► output path
//! └────────┘                   └────────┘        └──────────────┘    (or disc)
//!     ▲  RETRY: teardown, next track,              finished(track)
//!     └─ re-activate, start                        └─► TaskContext::finished
//! ```
//!
//! Stages live in a `Vec` and link to each other by [`StageId`]. The chain
//! owns both ends of every channel; stages see them through a
//! [`JobView`].
//!
//! Lifecycle methods report a [`BurnResult`]. A non-success code means a
//! hook failed and the error protocol has already delivered the failure to
//! the task context.

use std::sync::Arc;

use tracing::{debug, warn, Span};

use super::channel::{nonblocking_pipe, Input, Output};
use super::stage::{ChannelMode, StageEvent, StageOps, StageState, StopReason};
use super::view::{JobView, StageIo};
use crate::error::{BurnError, BurnResult, EngineResult, ErrorRemap};
use crate::task::TaskContext;
use crate::track::{Track, TrackKind};

/// Index of a stage inside its [`JobChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(usize);

impl StageId {
    pub fn index(&self) -> usize {
        self.0
    }
}

struct Node {
    ops: Box<dyn StageOps>,
    io: StageIo,
    prev: Option<StageId>,
    next: Option<StageId>,
    state: StageState,
}

/// Linear chain of stages.
///
/// Methods taking a [`StageId`] panic if the id was not returned by this
/// chain's [`JobChain::push`].
pub struct JobChain {
    nodes: Vec<Node>,
    remap: Option<ErrorRemap>,
    span: Span,
}

impl Default for JobChain {
    fn default() -> Self {
        Self::new()
    }
}

impl JobChain {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            remap: None,
            span: Span::none(),
        }
    }

    /// Builder: span every lifecycle log of this chain is emitted in.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Install the single observer allowed to rewrite failure codes.
    pub fn set_error_remap(&mut self, remap: ErrorRemap) {
        self.remap = Some(remap);
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Add an unconnected stage producing `output_kind`.
    pub fn push(&mut self, ops: Box<dyn StageOps>, output_kind: TrackKind) -> StageId {
        let id = StageId(self.nodes.len());
        self.nodes.push(Node {
            ops,
            io: StageIo::new(output_kind),
            prev: None,
            next: None,
            state: StageState::Uninitialized,
        });
        id
    }

    /// Add a stage and connect it after the current leader.
    pub fn append(&mut self, ops: Box<dyn StageOps>, output_kind: TrackKind) -> EngineResult<StageId> {
        let tail = self.leader();
        let id = self.push(ops, output_kind);
        if let Some(tail) = tail {
            self.connect(tail, id)?;
        }
        Ok(id)
    }

    /// Link `up` to `down`.
    pub fn connect(&mut self, up: StageId, down: StageId) -> EngineResult<()> {
        if up == down {
            return Err(BurnError::Protocol(format!(
                "cannot connect stage {} to itself",
                self.name(up)
            )));
        }
        if self.nodes[up.0].next.is_some() {
            return Err(BurnError::Protocol(format!(
                "stage {} already has a successor",
                self.name(up)
            )));
        }
        if self.nodes[down.0].prev.is_some() {
            return Err(BurnError::Protocol(format!(
                "stage {} already has a predecessor",
                self.name(down)
            )));
        }

        let mut cursor = Some(down);
        while let Some(id) = cursor {
            if id == up {
                return Err(BurnError::Protocol(format!(
                    "connecting {} to {} would create a cycle",
                    self.name(up),
                    self.name(down)
                )));
            }
            cursor = self.nodes[id.0].next;
        }

        self.nodes[up.0].next = Some(down);
        self.nodes[down.0].prev = Some(up);
        Ok(())
    }

    /// Check that the stages form one linear chain.
    pub fn validate(&self) -> EngineResult<()> {
        if self.nodes.is_empty() {
            return Err(BurnError::Protocol("chain has no stages".into()));
        }

        let heads = self.nodes.iter().filter(|n| n.prev.is_none()).count();
        let leaders = self.nodes.iter().filter(|n| n.next.is_none()).count();
        if heads != 1 || leaders != 1 {
            return Err(BurnError::Protocol(format!(
                "chain must have exactly one head and one leader (found {heads} and {leaders})"
            )));
        }

        let reachable = self.order().len();
        if reachable != self.nodes.len() {
            return Err(BurnError::Protocol(format!(
                "{} of {} stages are not reachable from the head",
                self.nodes.len() - reachable,
                self.nodes.len()
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn head(&self) -> Option<StageId> {
        self.nodes
            .iter()
            .position(|n| n.prev.is_none())
            .map(StageId)
    }

    /// The stage with no successor, if there is exactly one candidate.
    pub fn leader(&self) -> Option<StageId> {
        let mut leaders = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.next.is_none());
        match (leaders.next(), leaders.next()) {
            (Some((i, _)), None) => Some(StageId(i)),
            _ => None,
        }
    }

    /// Stage ids from the head to the leader.
    pub fn order(&self) -> Vec<StageId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut cursor = self.head();
        while let Some(id) = cursor {
            if order.len() == self.nodes.len() {
                break;
            }
            order.push(id);
            cursor = self.nodes[id.0].next;
        }
        order
    }

    pub fn name(&self, id: StageId) -> &str {
        self.nodes[id.0].ops.name()
    }

    pub fn state(&self, id: StageId) -> StageState {
        self.nodes[id.0].state
    }

    pub fn prev(&self, id: StageId) -> Option<StageId> {
        self.nodes[id.0].prev
    }

    pub fn next(&self, id: StageId) -> Option<StageId> {
        self.nodes[id.0].next
    }

    pub fn is_leader(&self, id: StageId) -> bool {
        self.nodes[id.0].next.is_none()
    }

    pub fn is_first(&self, id: StageId) -> bool {
        self.nodes[id.0].prev.is_none()
    }

    pub fn input(&self, id: StageId) -> Option<&Input> {
        self.nodes[id.0].io.input.as_ref()
    }

    pub fn output(&self, id: StageId) -> Option<&Output> {
        self.nodes[id.0].io.output.as_ref()
    }

    /// Task context currently bound to a stage.
    pub fn ctx(&self, id: StageId) -> Option<&Arc<TaskContext>> {
        self.nodes[id.0].io.ctx.as_ref()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Wire the output channel, bind `ctx` and run `init`.
    ///
    /// A stopped stage stays stopped: activating it is a no-op.
    pub fn activate(&mut self, id: StageId, ctx: &Arc<TaskContext>) -> BurnResult {
        let state = self.nodes[id.0].state;
        if state.is_stopped() {
            let _enter = self.span.enter();
            debug!(stage = self.name(id), ?state, "ignoring activation of stopped stage");
            return BurnResult::Ok;
        }
        if state.is_active() {
            let err = BurnError::Protocol(format!("stage {} is already active", self.name(id)));
            return self.fail(id, err, Some(ctx));
        }

        self.nodes[id.0].io.ctx = Some(Arc::clone(ctx));
        if let Err(err) = self.wire_output(id, ctx) {
            return self.error(id, err);
        }

        let result = self.with_view(id, |ops, view| ops.init(view));
        if let Err(err) = result {
            return self.error(id, err);
        }

        self.nodes[id.0].state = StageState::Activated;
        let _enter = self.span.enter();
        debug!(stage = self.name(id), "stage activated");
        BurnResult::Ok
    }

    fn wire_output(&mut self, id: StageId, ctx: &Arc<TaskContext>) -> EngineResult<()> {
        match self.nodes[id.0].next {
            Some(next) => match self.nodes[next.0].ops.input_mode() {
                ChannelMode::Pipe => {
                    if self.nodes[id.0].io.output.is_none() {
                        let (read, write) = nonblocking_pipe()?;
                        self.nodes[id.0].io.output = Some(Output::Pipe(write));
                        self.nodes[next.0].io.input = Some(Input::Pipe(read));
                        let _enter = self.span.enter();
                        debug!(
                            from = self.name(id),
                            to = self.name(next),
                            "allocated pipe"
                        );
                    }
                }
                ChannelMode::File => {
                    let path = ctx.session().tmp_file(None)?;
                    self.nodes[next.0].io.input = Some(Input::Path(path.clone()));
                    self.nodes[id.0].io.output = Some(Output::Path(path));
                }
            },
            None => {
                let kind = self.nodes[id.0].io.output_kind;
                self.nodes[id.0].io.output = None;
                if kind != TrackKind::Disc {
                    let path = ctx.session().output_path(kind)?;
                    self.nodes[id.0].io.output = Some(Output::Path(path));
                }
            }
        }
        Ok(())
    }

    /// Run the stage's `start` hook if activation succeeded.
    pub fn start(&mut self, id: StageId) -> BurnResult {
        if self.nodes[id.0].state != StageState::Activated {
            return BurnResult::Ok;
        }
        self.nodes[id.0].state = StageState::Running;
        {
            let _enter = self.span.enter();
            debug!(stage = self.name(id), "stage started");
        }

        match self.with_view(id, |ops, view| ops.start(view)) {
            Ok(event) => self.handle_event(id, event),
            Err(err) => self.error(id, err),
        }
    }

    /// Run the stage's non-blocking `poll` hook if it is running.
    pub fn poll(&mut self, id: StageId) -> BurnResult {
        if self.nodes[id.0].state != StageState::Running {
            return BurnResult::Ok;
        }
        match self.with_view(id, |ops, view| ops.poll(view)) {
            Ok(event) => self.handle_event(id, event),
            Err(err) => self.error(id, err),
        }
    }

    /// Tear the stage down.
    ///
    /// Runs teardown if the stage was active, closes its channel ends and
    /// releases the task context. Stopping a stopped stage does nothing.
    pub fn stop(&mut self, id: StageId, reason: StopReason) {
        let state = self.nodes[id.0].state;
        if state.is_stopped() {
            return;
        }

        if state.is_active() {
            if let Err(err) = self.with_view(id, |ops, view| ops.stop(view)) {
                if reason == StopReason::Ok {
                    self.error(id, err);
                } else {
                    let _enter = self.span.enter();
                    debug!(stage = self.name(id), error = %err, "teardown failed while stopping");
                }
            }
        }

        let node = &mut self.nodes[id.0];
        node.io.output.take();
        node.io.input.take();
        node.io.ctx = None;
        node.state = StageState::Stopped(reason);

        let _enter = self.span.enter();
        debug!(stage = self.name(id), %reason, "stage stopped");
    }

    fn handle_event(&mut self, id: StageId, event: StageEvent) -> BurnResult {
        match event {
            StageEvent::Running => BurnResult::Ok,
            StageEvent::Finished(track) => self.finish_unit(id, track),
        }
    }

    // =========================================================================
    // Finish and error protocols
    // =========================================================================

    /// A stage reports that its current unit of work is done.
    ///
    /// - first stage feeding a successor: teardown, advance to the next
    ///   track and restart (`Retry`), or close the write end when none is
    ///   left (`Ok`). Such a stage produces no session track, so `track`
    ///   is dropped;
    /// - the leader: the run is complete and `track` goes to the session;
    /// - a middle stage: protocol violation, routed through
    ///   [`JobChain::error`] and returned.
    pub fn finished(&mut self, id: StageId, track: Option<Track>) -> EngineResult<BurnResult> {
        if self.is_middle(id) {
            let message = self.middle_finish_message(id);
            self.error(id, BurnError::Protocol(message.clone()));
            return Err(BurnError::Protocol(message));
        }
        Ok(self.finish_unit(id, track))
    }

    fn finish_unit(&mut self, id: StageId, track: Option<Track>) -> BurnResult {
        if self.is_middle(id) {
            let message = self.middle_finish_message(id);
            return self.error(id, BurnError::Protocol(message));
        }

        let Some(ctx) = self.nodes[id.0].io.ctx.clone() else {
            let _enter = self.span.enter();
            warn!(stage = self.name(id), "stage finished without a task context");
            return BurnResult::Ok;
        };

        match (self.is_first(id), self.is_leader(id)) {
            (true, true) => self.finish_single(id, &ctx, track),
            (true, false) => {
                if let Some(track) = track {
                    let _enter = self.span.enter();
                    debug!(
                        stage = self.name(id),
                        track = track.id(),
                        "first stage has a successor, dropping finished track"
                    );
                }
                self.finish_first(id, &ctx)
            }
            _ => self.finish_leader(id, &ctx, track),
        }
    }

    /// First stage with a successor: iterate tracks, then signal end of data.
    fn finish_first(&mut self, id: StageId, ctx: &Arc<TaskContext>) -> BurnResult {
        if let Err(err) = self.teardown(id) {
            return self.error(id, err);
        }

        match ctx.next_track() {
            BurnResult::Retry => self.restart(id, ctx),
            _ => {
                let node = &mut self.nodes[id.0];
                node.io.output.take();
                node.io.ctx = None;
                node.state = StageState::Stopped(StopReason::Ok);
                let _enter = self.span.enter();
                debug!(stage = self.name(id), "no track left, closed output");
                BurnResult::Ok
            }
        }
    }

    /// Only stage of the chain: it both iterates tracks and completes the run.
    ///
    /// Teardown runs while the finished track is still current. After the
    /// last track the stage ends `Stopped(Ok)` so a later stop does not
    /// tear it down twice.
    fn finish_single(
        &mut self,
        id: StageId,
        ctx: &Arc<TaskContext>,
        track: Option<Track>,
    ) -> BurnResult {
        if let Err(err) = self.teardown(id) {
            return self.error(id, err);
        }

        match ctx.next_track() {
            BurnResult::Retry => {
                if let Some(track) = track {
                    ctx.add_track(track);
                }
                self.restart(id, ctx)
            }
            _ => {
                let result = self.finish_leader(id, ctx, track);
                let node = &mut self.nodes[id.0];
                node.io.output.take();
                node.io.input.take();
                node.io.ctx = None;
                node.state = StageState::Stopped(StopReason::Ok);
                result
            }
        }
    }

    fn finish_leader(
        &mut self,
        id: StageId,
        ctx: &Arc<TaskContext>,
        track: Option<Track>,
    ) -> BurnResult {
        {
            let _enter = self.span.enter();
            debug!(
                stage = self.name(id),
                track = track.as_ref().map(Track::id),
                "leader finished"
            );
        }
        // A context finalised elsewhere (cancel, earlier failure) keeps its
        // first outcome.
        let _ = ctx.finished(track);
        BurnResult::Ok
    }

    fn teardown(&mut self, id: StageId) -> EngineResult<()> {
        self.with_view(id, |ops, view| ops.stop(view))
    }

    fn restart(&mut self, id: StageId, ctx: &Arc<TaskContext>) -> BurnResult {
        {
            let _enter = self.span.enter();
            debug!(stage = self.name(id), "restarting for next track");
        }
        self.nodes[id.0].state = StageState::Uninitialized;
        match self.activate(id, ctx) {
            BurnResult::Ok => {}
            failure => return failure,
        }
        match self.start(id) {
            BurnResult::Ok => BurnResult::Retry,
            other => other,
        }
    }

    /// Route a stage failure to the task context.
    ///
    /// The remap observer, if installed, may rewrite the result code first.
    /// A success code coming back from the observer is reported as
    /// [`BurnResult::Failed`].
    pub fn error(&mut self, id: StageId, err: BurnError) -> BurnResult {
        let ctx = self.nodes[id.0].io.ctx.clone();
        self.fail(id, err, ctx.as_ref())
    }

    fn fail(&mut self, id: StageId, err: BurnError, ctx: Option<&Arc<TaskContext>>) -> BurnResult {
        let mut result = err.default_result();
        if let Some(remap) = self.remap.as_mut() {
            result = remap(result, &err);
        }
        if result.is_success() {
            result = BurnResult::Failed;
        }

        let _enter = self.span.enter();
        warn!(stage = self.name(id), %result, error = %err, "stage error");
        match ctx {
            Some(ctx) => {
                let _ = ctx.error(result, err);
            }
            None => warn!(stage = self.name(id), "no task context to report the error to"),
        }
        result
    }

    fn is_middle(&self, id: StageId) -> bool {
        !self.is_first(id) && !self.is_leader(id)
    }

    fn middle_finish_message(&self, id: StageId) -> String {
        format!(
            "stage {} finished on its own but it has both a predecessor and a successor",
            self.name(id)
        )
    }

    fn with_view<R>(
        &mut self,
        id: StageId,
        f: impl FnOnce(&mut dyn StageOps, &JobView<'_>) -> R,
    ) -> R {
        let is_first = self.nodes[id.0].prev.is_none();
        let is_leader = self.nodes[id.0].next.is_none();
        let Node { ops, io, .. } = &mut self.nodes[id.0];
        let name = ops.name().to_string();
        let view = JobView::new(&name, io, is_first, is_leader);
        f(ops.as_mut(), &view)
    }

    // =========================================================================
    // Whole-chain helpers
    // =========================================================================

    /// Activate every stage from the head to the leader.
    pub fn activate_all(&mut self, ctx: &Arc<TaskContext>) -> BurnResult {
        for id in self.order() {
            match self.activate(id, ctx) {
                BurnResult::Ok => {}
                failure => return failure,
            }
        }
        BurnResult::Ok
    }

    /// Start every stage, leader first so readers exist before writers.
    pub fn start_all(&mut self) -> BurnResult {
        for id in self.order().into_iter().rev() {
            match self.start(id) {
                BurnResult::Ok | BurnResult::Retry => {}
                failure => return failure,
            }
        }
        BurnResult::Ok
    }

    /// Poll every running stage once.
    pub fn poll_all(&mut self) -> BurnResult {
        for id in self.order() {
            match self.poll(id) {
                BurnResult::Ok | BurnResult::Retry => {}
                failure => return failure,
            }
        }
        BurnResult::Ok
    }

    /// Stop every stage from the head to the leader.
    pub fn stop_all(&mut self, reason: StopReason) {
        for id in self.order() {
            self.stop(id, reason);
        }
    }

    /// True once every stage is stopped.
    pub fn is_stopped(&self) -> bool {
        self.nodes.iter().all(|n| n.state.is_stopped())
    }
}

impl std::fmt::Debug for JobChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stages: Vec<_> = self
            .order()
            .into_iter()
            .map(|id| (self.name(id).to_string(), self.state(id)))
            .collect();
        f.debug_struct("JobChain")
            .field("stages", &stages)
            .field("remap", &self.remap.is_some())
            .finish()
    }
}
