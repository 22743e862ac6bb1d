use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use async_channel::Sender;

use crate::config::Config;
use crate::queue::{WorkItem, WorkQueue};
use crate::storage::StorageFactoryRef;
use crate::types::token::PipelineCancellationToken;
use crate::types::{ReplicationStatistics, ReplicationStatsReport};

/// Result of handing a work item to the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    Success,
    Closed,
}

/// Shared context handed to the enumerator and to each worker.
///
/// The config is an owned read-only copy. The queue, the statistics report
/// and the warning flag are shared with the driver. The session factory is
/// cloned per component so each one builds its own sessions.
pub struct Stage {
    pub config: Config,
    pub queue: Arc<WorkQueue>,
    pub storage_factory: StorageFactoryRef,
    pub cancellation_token: PipelineCancellationToken,
    pub stats_sender: Sender<ReplicationStatistics>,
    pub stats_report: Arc<ReplicationStatsReport>,
    pub has_warning: Arc<AtomicBool>,
}

impl Stage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        queue: Arc<WorkQueue>,
        storage_factory: StorageFactoryRef,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<ReplicationStatistics>,
        stats_report: Arc<ReplicationStatsReport>,
        has_warning: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            queue,
            storage_factory,
            cancellation_token,
            stats_sender,
            stats_report,
            has_warning,
        }
    }

    /// Put a work item on the queue, waiting for a free slot.
    ///
    /// Returns `SendResult::Closed` if the queue has been closed (e.g. due to
    /// cancellation), allowing the caller to exit gracefully.
    pub async fn send(&self, item: WorkItem) -> Result<SendResult> {
        let result = self
            .queue
            .put(item)
            .await
            .context("WorkQueue::put() failed.");

        if let Err(e) = result {
            return if !self.queue.is_closed() {
                Err(anyhow!(e))
            } else {
                Ok(SendResult::Closed)
            };
        }

        Ok(SendResult::Success)
    }

    /// Send a statistics event to the progress consumer.
    pub async fn send_stats(&self, stats: ReplicationStatistics) {
        let _ = self.stats_sender.send(stats).await;
    }

    /// Set the warning flag to indicate a non-fatal issue occurred.
    pub fn set_warning(&self) {
        self.has_warning.store(true, Ordering::SeqCst);
    }
}
