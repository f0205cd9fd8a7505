//! Per-run progress, timing and multi-track iteration.

mod action;
mod context;
mod rate;

pub use action::{CurrentAction, TaskAction};
pub use context::{CompletionCallback, TaskContext};
pub use rate::{RateEstimator, ETA_SAMPLES, RATE_UPDATE_INTERVAL};
