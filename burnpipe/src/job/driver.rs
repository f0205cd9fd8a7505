//! Orchestrator loop running a chain to completion.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Span};

use super::chain::JobChain;
use super::stage::StopReason;
use crate::error::{BurnError, BurnResult, Completion, Failure};
use crate::task::TaskContext;

/// Default time between two `poll_all` rounds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Cloneable handle to a running chain.
#[derive(Clone)]
pub struct ChainHandle {
    chain: Arc<Mutex<JobChain>>,
    cancel: CancellationToken,
}

impl ChainHandle {
    /// Stop every stage and make the driver finish with a cancellation.
    ///
    /// Safe from any thread, including while the driver is polling.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.chain.lock().stop_all(StopReason::Cancelled);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Shared chain, for inspection.
    pub fn chain(&self) -> &Arc<Mutex<JobChain>> {
        &self.chain
    }
}

/// Drives a [`JobChain`] on the calling thread.
///
/// # Example
///
/// ```ignore
/// let driver = ChainDriver::new(chain, Arc::clone(&ctx))
///     .with_poll_interval(config.poll_interval);
/// let handle = driver.handle();
/// ctrlc::set_handler(move || handle.cancel())?;
/// driver.run()?;
/// ```
pub struct ChainDriver {
    chain: Arc<Mutex<JobChain>>,
    ctx: Arc<TaskContext>,
    cancel: CancellationToken,
    poll_interval: Duration,
    span: Span,
}

impl ChainDriver {
    pub fn new(chain: JobChain, ctx: Arc<TaskContext>) -> Self {
        Self {
            chain: Arc::new(Mutex::new(chain)),
            ctx,
            cancel: CancellationToken::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            span: Span::none(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Use an externally owned token instead of a fresh one.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn handle(&self) -> ChainHandle {
        ChainHandle {
            chain: Arc::clone(&self.chain),
            cancel: self.cancel.clone(),
        }
    }

    /// Run the chain until the task context completes or the token fires.
    ///
    /// Installs its own completion callback on the context and returns what
    /// that callback received. Every stage is stopped before returning.
    pub fn run(self) -> Completion {
        let _enter = self.span.enter();
        let slot: Arc<Mutex<Option<Completion>>> = Arc::new(Mutex::new(None));
        {
            let slot = Arc::clone(&slot);
            self.ctx
                .on_completion(Box::new(move |completion| *slot.lock() = Some(completion)));
        }

        self.launch();

        while !self.ctx.is_completed() {
            if self.cancel.is_cancelled() {
                let _ = self.ctx.error(BurnResult::Cancelled, BurnError::Cancelled);
                break;
            }
            std::thread::sleep(self.poll_interval);
            self.chain.lock().poll_all();
        }

        let completion = slot.lock().take().unwrap_or_else(|| {
            Err(Failure {
                result: BurnResult::Failed,
                error: BurnError::Protocol("run ended without a completion".into()),
            })
        });

        let reason = match &completion {
            Ok(()) => StopReason::Ok,
            Err(failure) if failure.result == BurnResult::Cancelled => StopReason::Cancelled,
            Err(_) => StopReason::Error,
        };
        self.chain.lock().stop_all(reason);
        info!(%reason, "chain stopped");
        completion
    }

    fn launch(&self) {
        let mut chain = self.chain.lock();
        if self.cancel.is_cancelled() {
            return;
        }
        if let Err(err) = chain.validate() {
            let _ = self.ctx.error(BurnResult::Failed, err);
            return;
        }

        debug!(stages = chain.len(), "activating chain");
        if chain.activate_all(&self.ctx).is_success() {
            chain.start_all();
        }
    }
}
