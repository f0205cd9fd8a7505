//! Stage trait and lifecycle types.
//!
//! A stage is one node in a [`super::JobChain`]. The chain owns the
//! channels, the lifecycle and the finish/error protocols; the stage only
//! supplies the [`StageOps`] hooks.

use std::fmt;

use super::view::JobView;
use crate::error::EngineResult;
use crate::track::Track;

/// How a stage wants to receive data from its predecessor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelMode {
    /// Stream through an OS pipe.
    #[default]
    Pipe,
    /// Read a temporary file once the predecessor has written it.
    File,
}

/// What a `start` or `poll` hook reports back.
#[derive(Debug)]
pub enum StageEvent {
    /// Still working; poll again later.
    Running,
    /// The current unit of work is done, optionally producing a track.
    Finished(Option<Track>),
}

/// Why a stage was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Ok,
    Error,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of one stage.
///
/// ```text
/// Uninitialized -> Activated -> Running -> Stopped(reason)
/// ```
///
/// `Stopped` is reachable from every state and entering it twice is a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StageState {
    #[default]
    Uninitialized,
    Activated,
    Running,
    Stopped(StopReason),
}

impl StageState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }

    /// True once activation wired the channels and ran `init`.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Activated | Self::Running)
    }
}

/// Stage-specific behaviour plugged into a chain.
///
/// Every hook receives a [`JobView`] giving position-dependent access to the
/// channels, the session and the task context. Returning `Err` routes the
/// error through the chain's error protocol.
///
/// # Example
///
/// ```ignore
/// struct Checksum { worker: Option<JoinHandle<io::Result<String>>> }
///
/// impl StageOps for Checksum {
///     fn name(&self) -> &str { "checksum" }
///
///     fn start(&mut self, job: &JobView<'_>) -> EngineResult<StageEvent> {
///         let input = job.input_path()?.to_path_buf();
///         self.worker = Some(std::thread::spawn(move || sha_file(&input)));
///         Ok(StageEvent::Running)
///     }
///
///     fn poll(&mut self, _job: &JobView<'_>) -> EngineResult<StageEvent> {
///         match &self.worker {
///             Some(w) if w.is_finished() => Ok(StageEvent::Finished(None)),
///             _ => Ok(StageEvent::Running),
///         }
///     }
/// }
/// ```
pub trait StageOps: Send {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Channel this stage wants on its input side.
    fn input_mode(&self) -> ChannelMode {
        ChannelMode::Pipe
    }

    /// Called once per activation, after the channels are wired.
    fn init(&mut self, _job: &JobView<'_>) -> EngineResult<()> {
        Ok(())
    }

    /// Begin work on the current track.
    fn start(&mut self, job: &JobView<'_>) -> EngineResult<StageEvent>;

    /// Periodic hook. Must not block.
    fn poll(&mut self, _job: &JobView<'_>) -> EngineResult<StageEvent> {
        Ok(StageEvent::Running)
    }

    /// Teardown. Release worker threads and any cloned channel handles.
    fn stop(&mut self, _job: &JobView<'_>) -> EngineResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(!StageState::Uninitialized.is_active());
        assert!(StageState::Activated.is_active());
        assert!(StageState::Running.is_active());
        assert!(StageState::Stopped(StopReason::Ok).is_stopped());
        assert!(!StageState::Stopped(StopReason::Cancelled).is_active());
    }

    #[test]
    fn test_default_channel_mode_is_pipe() {
        assert_eq!(ChannelMode::default(), ChannelMode::Pipe);
    }
}
