//! Operation filtering and readiness waits shared by plugins.
use std::{collections::BTreeSet, fmt, sync::Arc, time::Duration};

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    attributes::Operation,
    error::{AdmissionError, Result},
};

/// How long [`Handler::wait_for_ready`] waits by default
pub const READINESS_TIMEOUT: Duration = Duration::from_secs(10);
const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Reports whether a plugin has everything it needs to serve requests
pub type ReadyFunc = Arc<dyn Fn() -> bool + Send + Sync>;

/// Building block for plugins: the operations a plugin handles, and an
/// optional readiness probe that requests wait on.
#[derive(Clone)]
pub struct Handler {
    operations: BTreeSet<Operation>,
    ready: Option<ReadyFunc>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("operations", &self.operations)
            .field("has_ready_func", &self.ready.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Handler {
    /// A handler for `operations` that is always ready
    pub fn new(operations: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            operations: operations.into_iter().collect(),
            ready: None,
            timeout: READINESS_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    /// Whether `operation` is handled
    pub fn handles(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }

    /// Install a readiness probe
    pub fn set_ready_func(&mut self, ready: impl Fn() -> bool + Send + Sync + 'static) {
        self.ready = Some(Arc::new(ready));
    }

    /// Wait at most `timeout` for readiness
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Abandon readiness waits once `cancel` fires
    pub fn set_cancellation(&mut self, cancel: CancellationToken) {
        self.cancel = cancel;
    }

    /// Poll the readiness probe until it passes, the timeout elapses, or the
    /// handler is cancelled. Returns the final probe result.
    pub async fn wait_for_ready(&self) -> bool {
        let Some(ready) = &self.ready else {
            return true;
        };
        let deadline = Instant::now() + self.timeout;
        let mut poll = time::interval(READINESS_POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return ready(),
                _ = poll.tick() => {
                    if ready() {
                        return true;
                    }
                    if Instant::now() >= deadline {
                        tracing::debug!(timeout = ?self.timeout, "admission plugin not ready in time");
                        return false;
                    }
                }
            }
        }
    }

    /// [`wait_for_ready`](Handler::wait_for_ready), failing with
    /// [`AdmissionError::NotReady`] when the plugin never became ready
    pub async fn ensure_ready(&self) -> Result<()> {
        if self.wait_for_ready().await {
            Ok(())
        } else {
            Err(AdmissionError::NotReady)
        }
    }
}
