//! Stage chains: linking, channel wiring, lifecycle and the finish/error
//! protocols.
//!
//! # Example
//!
//! ```ignore
//! use burnpipe::job::{ChainDriver, JobChain};
//!
//! let mut chain = JobChain::new();
//! chain.append(Box::new(Encoder::new()), TrackKind::Audio)?;
//! chain.append(Box::new(Recorder::new()), TrackKind::Disc)?;
//!
//! let ctx = Arc::new(TaskContext::new(session, TaskAction::Normal));
//! ChainDriver::new(chain, ctx).run()?;
//! ```

mod chain;
mod channel;
mod driver;
mod stage;
mod view;

pub use chain::{JobChain, StageId};
pub use channel::{is_nonblocking, nonblocking_pipe, Input, Output};
pub use driver::{ChainDriver, ChainHandle, DEFAULT_POLL_INTERVAL};
pub use stage::{ChannelMode, StageEvent, StageOps, StageState, StopReason};
pub use view::{JobAction, JobView};
