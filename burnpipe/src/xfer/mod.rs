//! Blocking, cancellable materialization of a source onto local storage.
//!
//! ```text
//! caller thread                      worker thread "burnpipe-xfer"
//! ─────────────                      ─────────────────────────────
//! run_blocking ── spawn ───────────► measure(src) -> total
//!      │                             copy(src, dest)  (checks token)
//!      ▼                                  │
//! block_on(select(wake, cancelled)) ◄─────┘ wake.send(())
//!      │
//! join worker (always)
//! ```

mod blocking;
mod copy;
mod measure;
mod progress;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::error::EngineResult;

pub use blocking::resolve_source;
pub use copy::{copy, DEFAULT_BUFFER_SIZE};
pub use measure::measure;
pub use progress::XferProgress;

/// How a transfer ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XferOutcome {
    Completed,
    Cancelled,
}

impl fmt::Display for XferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// One transfer and its progress counters.
///
/// Create one per transfer. [`Xfer::progress`] may be polled from any
/// thread while [`Xfer::run_blocking`] runs elsewhere.
#[derive(Debug)]
pub struct Xfer {
    progress: Arc<XferProgress>,
    buffer_size: usize,
    span: Span,
}

impl Default for Xfer {
    fn default() -> Self {
        Self::new()
    }
}

impl Xfer {
    pub fn new() -> Self {
        Self {
            progress: Arc::new(XferProgress::new()),
            buffer_size: DEFAULT_BUFFER_SIZE,
            span: Span::none(),
        }
    }

    /// Builder: chunk size for file copies.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Size of `src` in bytes; also recorded as this transfer's total.
    pub fn measure(&self, src: &Path) -> EngineResult<u64> {
        let total = measure(src)?;
        self.progress.set_total(total);
        Ok(total)
    }

    /// Copy on the calling thread.
    pub fn copy(
        &self,
        src: &Path,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> EngineResult<XferOutcome> {
        copy(src, dest, cancel, &self.progress, self.buffer_size)
    }

    /// Best-effort `(copied, total)` snapshot.
    pub fn progress(&self) -> (u64, u64) {
        self.progress.snapshot()
    }

    /// Shared counters, for a UI thread that outlives the borrow of `self`.
    pub fn progress_handle(&self) -> Arc<XferProgress> {
        Arc::clone(&self.progress)
    }
}
