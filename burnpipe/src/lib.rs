//! burnpipe - job-pipeline engine for disc burning
//!
//! This library chains processing stages (image builders, encoders,
//! checksum generators, recorders) into a linear pipeline, wires the data
//! flow between them, drives their lifecycle and tracks progress, rate and
//! ETA over one or more tracks. It also provides [`xfer::Xfer`], a blocking
//! and cancellable copy used to bring a source onto local storage before a
//! pipeline consumes it.
//!
//! # Modules
//!
//! - [`job`] - stage chain, channels, finish/error protocols, driver loop
//! - [`task`] - per-run progress, timing and track iteration
//! - [`xfer`] - local materialization of a source tree
//! - [`session`] - the burn session boundary
//! - [`track`] - units of burnable content
//! - [`config`] / [`logging`] - INI configuration and subscriber setup

pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod session;
pub mod task;
pub mod track;
pub mod xfer;

pub use error::{BurnError, BurnResult, Completion, EngineResult, Failure, Unavailable};
pub use job::{ChainDriver, JobChain, StageOps};
pub use session::{LocalSession, Session};
pub use task::{TaskAction, TaskContext};
pub use track::{Track, TrackKind};
pub use xfer::{Xfer, XferOutcome};
