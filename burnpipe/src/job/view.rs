//! Position-dependent view of the chain handed to stage hooks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::channel::{Input, Output};
use crate::error::{BurnError, EngineResult, Unavailable};
use crate::session::{Drive, Session, SessionFlags};
use crate::task::{TaskAction, TaskContext};
use crate::track::{Track, TrackKind};

/// High-level operation a stage is asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    /// Estimate the output size without producing it.
    Size,
    /// Produce an image (file or stream) for the next stage.
    Image,
    /// Write to a disc.
    Record,
    /// Blank a disc.
    Erase,
    /// Verify a checksum.
    Checksum,
}

/// Channels and context of one stage, owned by the chain.
#[derive(Debug)]
pub(crate) struct StageIo {
    pub(crate) input: Option<Input>,
    pub(crate) output: Option<Output>,
    pub(crate) output_kind: TrackKind,
    pub(crate) ctx: Option<Arc<TaskContext>>,
}

impl StageIo {
    pub(crate) fn new(output_kind: TrackKind) -> Self {
        Self {
            input: None,
            output: None,
            output_kind,
            ctx: None,
        }
    }
}

/// What a stage sees of the chain during a hook.
///
/// Accessors that make no sense for the stage's position return
/// [`Unavailable::NotApplicable`]; values that exist but are not known
/// yet return [`Unavailable::NotReady`]; anything needing the task context
/// returns [`Unavailable::NotRunning`] while no context is bound.
pub struct JobView<'a> {
    name: &'a str,
    io: &'a StageIo,
    is_first: bool,
    is_leader: bool,
}

impl<'a> JobView<'a> {
    pub(crate) fn new(name: &'a str, io: &'a StageIo, is_first: bool, is_leader: bool) -> Self {
        Self {
            name,
            io,
            is_first,
            is_leader,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// True if the stage has no successor.
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    /// True if the stage has no predecessor.
    pub fn is_first(&self) -> bool {
        self.is_first
    }

    /// Kind of content this stage produces.
    pub fn output_kind(&self) -> TrackKind {
        self.io.output_kind
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    pub fn input(&self) -> Result<&'a Input, Unavailable> {
        if self.is_first {
            return Err(Unavailable::NotApplicable);
        }
        self.io.input.as_ref().ok_or(Unavailable::NotReady)
    }

    /// Input file written by the predecessor.
    pub fn input_path(&self) -> Result<&'a Path, Unavailable> {
        self.input()?.path().ok_or(Unavailable::NotApplicable)
    }

    pub fn output(&self) -> Result<&'a Output, Unavailable> {
        if self.is_leader && self.io.output_kind == TrackKind::Disc {
            return Err(Unavailable::NotApplicable);
        }
        self.io.output.as_ref().ok_or(Unavailable::NotReady)
    }

    /// File this stage writes to.
    pub fn output_path(&self) -> Result<&'a Path, Unavailable> {
        self.output()?.path().ok_or(Unavailable::NotApplicable)
    }

    // ------------------------------------------------------------------
    // Task context
    // ------------------------------------------------------------------

    pub fn ctx(&self) -> Result<&'a Arc<TaskContext>, Unavailable> {
        self.io.ctx.as_ref().ok_or(Unavailable::NotRunning)
    }

    pub fn tracks(&self) -> Result<Vec<Track>, Unavailable> {
        Ok(self.ctx()?.tracks())
    }

    pub fn current_track(&self) -> Result<Track, Unavailable> {
        self.ctx()?.current_track().ok_or(Unavailable::NotReady)
    }

    /// The operation requested from this stage.
    ///
    /// A fake run only sizes. Stages feeding another stage always image;
    /// the leader does what the task was created for.
    pub fn action(&self) -> Result<JobAction, Unavailable> {
        let ctx = self.ctx()?;
        if ctx.is_fake() {
            return Ok(JobAction::Size);
        }
        if !self.is_leader {
            return Ok(JobAction::Image);
        }
        Ok(match ctx.action() {
            TaskAction::Erase => JobAction::Erase,
            TaskAction::Checksum => JobAction::Checksum,
            TaskAction::Normal if self.io.output_kind == TrackKind::Disc => JobAction::Record,
            TaskAction::Normal => JobAction::Image,
        })
    }

    pub fn session_output_size(&self) -> Result<(u64, u64), Unavailable> {
        self.ctx()?.session_output_size()
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    pub fn session(&self) -> Result<&'a Arc<dyn Session>, Unavailable> {
        Ok(self.ctx()?.session())
    }

    pub fn flags(&self) -> Result<SessionFlags, Unavailable> {
        Ok(self.session()?.flags())
    }

    /// Target drive; only the recording leader has one.
    pub fn drive(&self) -> Result<Drive, Unavailable> {
        if !self.is_leader || self.io.output_kind != TrackKind::Disc {
            return Err(Unavailable::NotApplicable);
        }
        self.session()?.drive().ok_or(Unavailable::NotApplicable)
    }

    /// Requested write speed in bytes/s.
    pub fn rate(&self) -> Result<u64, Unavailable> {
        self.session()?.rate().ok_or(Unavailable::NotApplicable)
    }

    pub fn tmp_file(&self, suffix: Option<&str>) -> EngineResult<PathBuf> {
        self.bound_session()?.tmp_file(suffix)
    }

    pub fn tmp_dir(&self) -> EngineResult<PathBuf> {
        self.bound_session()?.tmp_dir()
    }

    /// Title for an audio track: the track's own label, else the session's.
    pub fn audio_title(&self) -> Result<String, Unavailable> {
        let track = self.current_track()?;
        if track.kind() != TrackKind::Audio {
            return Err(Unavailable::NotApplicable);
        }
        track
            .label()
            .or_else(|| self.session().ok().and_then(|s| s.label()))
            .ok_or(Unavailable::NotReady)
    }

    /// Volume label for data content.
    pub fn data_label(&self) -> Result<String, Unavailable> {
        let track = self.current_track()?;
        if !matches!(track.kind(), TrackKind::Data | TrackKind::Image) {
            return Err(Unavailable::NotApplicable);
        }
        self.session()?.label().ok_or(Unavailable::NotReady)
    }

    /// Where an appended session starts on the loaded medium.
    pub fn next_writable_address(&self) -> Result<u64, Unavailable> {
        let drive = self.appending_drive()?;
        drive.next_writable_address.ok_or(Unavailable::NotReady)
    }

    /// Start of the medium's last session, for merging.
    pub fn last_session_address(&self) -> Result<u64, Unavailable> {
        let drive = self.appending_drive()?;
        drive.last_session_address.ok_or(Unavailable::NotReady)
    }

    fn appending_drive(&self) -> Result<Drive, Unavailable> {
        let session = self.session()?;
        let flags = session.flags();
        if !flags.append && !flags.merge {
            return Err(Unavailable::NotApplicable);
        }
        session.drive().ok_or(Unavailable::NotApplicable)
    }

    fn bound_session(&self) -> EngineResult<&'a Arc<dyn Session>> {
        self.session().map_err(|_| {
            BurnError::Protocol(format!("stage {} is not bound to a task", self.name))
        })
    }
}
