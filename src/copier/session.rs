use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};

use crate::config::{SessionRefreshPolicy, SessionRetryConfig};
use crate::storage::{Storage, StorageFactoryRef};
use crate::types::error::S3mirrorError;
use crate::types::token::PipelineCancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshReason {
    Initial,
    AfterError,
    Periodic,
}

impl RefreshReason {
    fn as_str(self) -> &'static str {
        match self {
            RefreshReason::Initial => "initial",
            RefreshReason::AfterError => "after error",
            RefreshReason::Periodic => "periodic",
        }
    }
}

/// Per-worker session state. Owned by exactly one worker.
pub struct WorkerState {
    storage: Option<Storage>,
    operations_since_refresh: u64,
    last_item_failed: bool,
    refresh_policy: SessionRefreshPolicy,
}

impl WorkerState {
    pub fn new(refresh_policy: SessionRefreshPolicy) -> Self {
        Self {
            storage: None,
            operations_since_refresh: 0,
            last_item_failed: false,
            refresh_policy,
        }
    }

    /// Whether a new session must be built before the next item.
    pub fn needs_refresh(&self) -> bool {
        if self.storage.is_none() {
            return true;
        }
        if self.refresh_policy.refresh_on_error && self.last_item_failed {
            return true;
        }
        0 < self.refresh_policy.refresh_every
            && self.refresh_policy.refresh_every <= self.operations_since_refresh
    }

    pub fn record_success(&mut self) {
        self.operations_since_refresh += 1;
        self.last_item_failed = false;
    }

    pub fn record_failure(&mut self) {
        self.last_item_failed = true;
    }

    pub fn operations_since_refresh(&self) -> u64 {
        self.operations_since_refresh
    }

    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_ref()
    }

    fn refresh_reason(&self) -> RefreshReason {
        if self.storage.is_none() {
            RefreshReason::Initial
        } else if self.last_item_failed {
            RefreshReason::AfterError
        } else {
            RefreshReason::Periodic
        }
    }

    /// Replace the session, retrying construction per `retry_config`.
    ///
    /// The previous session is dropped first. On exhaustion the worker has no
    /// session and an [`S3mirrorError::Session`] error is returned.
    pub async fn refresh(
        &mut self,
        worker_index: u16,
        factory: &StorageFactoryRef,
        retry_config: &SessionRetryConfig,
        cancellation_token: &PipelineCancellationToken,
    ) -> Result<()> {
        let reason = self.refresh_reason();
        self.storage = None;

        let interval = Duration::from_millis(retry_config.session_retry_interval_milliseconds);
        let mut attempt: u32 = 0;

        loop {
            match factory.create().await {
                Ok(storage) => {
                    if reason == RefreshReason::Initial {
                        debug!(worker_index = worker_index, "session has been created.");
                    } else {
                        info!(
                            worker_index = worker_index,
                            reason = reason.as_str(),
                            operations = self.operations_since_refresh,
                            "session has been refreshed."
                        );
                    }

                    self.storage = Some(storage);
                    self.operations_since_refresh = 0;
                    self.last_item_failed = false;
                    return Ok(());
                }
                Err(e) => {
                    if retry_config.session_retry_count <= attempt {
                        return Err(anyhow!(S3mirrorError::Session(format!(
                            "worker {worker_index} could not build a session after {} attempts: {e:#}",
                            attempt + 1
                        ))));
                    }
                    attempt += 1;

                    warn!(
                        worker_index = worker_index,
                        attempt = attempt,
                        error = format!("{e:#}"),
                        "failed to build a session. retrying."
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancellation_token.cancelled() => {
                    return Err(anyhow!(S3mirrorError::Cancelled));
                }
            }
        }
    }
}
