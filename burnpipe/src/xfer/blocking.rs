//! Blocking transfer on a dedicated worker thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::{self, Either};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::{copy, measure, Xfer, XferOutcome};
use crate::error::{BurnError, EngineResult};

impl Xfer {
    /// Materialize `src_uri` at `dest`, blocking the calling thread.
    ///
    /// `src_uri` is a local path or a `file://` URI. Measuring and copying
    /// run on one worker thread. The caller wakes when the worker is done or
    /// when `cancel` fires, and in both cases joins the worker before
    /// returning.
    pub fn run_blocking(
        &self,
        src_uri: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> EngineResult<XferOutcome> {
        let _enter = self.span.enter();
        let src = resolve_source(src_uri)?;
        self.progress.reset();

        let (wake_tx, wake_rx) = oneshot::channel::<()>();
        let progress = Arc::clone(&self.progress);
        let worker_cancel = cancel.clone();
        let worker_dest = dest.to_path_buf();
        let buffer_size = self.buffer_size;

        debug!(src = %src.display(), dest = %dest.display(), "spawning transfer worker");
        let worker = std::thread::Builder::new()
            .name("burnpipe-xfer".to_string())
            .spawn(move || {
                let result = measure(&src).and_then(|total| {
                    progress.set_total(total);
                    copy(&src, &worker_dest, &worker_cancel, &progress, buffer_size)
                });
                let _ = wake_tx.send(());
                result
            })
            .map_err(|e| BurnError::resource("transfer worker", e))?;

        let cancelled = Box::pin(cancel.cancelled());
        match futures::executor::block_on(future::select(wake_rx, cancelled)) {
            Either::Left(_) => debug!("transfer worker signalled completion"),
            Either::Right(_) => debug!("transfer cancelled, waiting for worker"),
        }

        let result = worker
            .join()
            .map_err(|_| BurnError::stage("xfer", "transfer worker panicked"))?;

        if cancel.is_cancelled() {
            info!(dest = %dest.display(), "transfer cancelled");
            return Ok(XferOutcome::Cancelled);
        }
        match &result {
            Ok(outcome) => {
                let (copied, total) = self.progress();
                info!(dest = %dest.display(), copied, total, %outcome, "transfer finished");
            }
            Err(err) => warn!(error = %err, "transfer failed"),
        }
        result
    }
}

/// Turn a path or `file://` URI into a local path.
pub fn resolve_source(src_uri: &str) -> EngineResult<PathBuf> {
    if !src_uri.contains("://") {
        return Ok(PathBuf::from(src_uri));
    }

    let url = Url::parse(src_uri)
        .map_err(|e| BurnError::Unsupported(format!("source {src_uri}: {e}")))?;
    if url.scheme() != "file" {
        return Err(BurnError::Unsupported(format!(
            "{} sources cannot be transferred",
            url.scheme()
        )));
    }
    url.to_file_path()
        .map_err(|_| BurnError::Unsupported(format!("{src_uri} is not a local file URI")))
}
