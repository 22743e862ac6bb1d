use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, error, info};

use crate::queue::WorkItem;
use crate::stage::{SendResult, Stage};
use crate::types::ReplicationStatistics;
use crate::types::error::S3mirrorError;

/// Enumerates the source prefix page by page and feeds keys to the work queue.
///
/// ```text
/// ObjectLister → WorkQueue → ObjectCopier × N
/// ```
///
/// Pagination uses the last key of a page as the marker for the next one.
/// A page shorter than `max_keys` (or an empty page) ends the listing.
/// Before each request the lister waits until the queue has room for a full
/// page, which is the only flow control between the lister and the workers.
///
/// Any listing failure stops the enumeration immediately and is not retried.
/// Keys that were already queued are still processed by the workers.
pub struct ObjectLister {
    stage: Stage,
}

impl ObjectLister {
    pub fn new(stage: Stage) -> Self {
        Self { stage }
    }

    /// List every key under the source prefix onto the work queue.
    ///
    /// Returns `Ok` when the last page was reached or the run was cancelled
    /// (queue closed or cancellation token fired). Returns an
    /// [`S3mirrorError::Listing`] error when a session could not be built or
    /// a page request failed.
    pub async fn list_source(&self) -> Result<()> {
        debug!("list source objects has started.");

        let storage = self.stage.storage_factory.create().await.map_err(|e| {
            error!(error = format!("{e:#}"), "failed to create a listing session.");
            anyhow!(S3mirrorError::Listing(format!(
                "failed to create a listing session: {e:#}"
            )))
        })?;

        let bucket = self.stage.config.source.bucket();
        let prefix = self.stage.config.source.prefix();
        let max_keys = self.stage.config.max_keys;

        let mut marker: Option<String> = None;
        let mut page_number: u64 = 0;

        loop {
            if !self.wait_for_headroom().await {
                debug!("list source objects has been cancelled.");
                return Ok(());
            }

            let page = storage
                .list_objects(bucket, prefix, marker.as_deref(), max_keys)
                .await
                .map_err(|e| {
                    error!(
                        bucket = bucket,
                        prefix = prefix,
                        marker = marker.as_deref(),
                        error = format!("{e:#}"),
                        "listing failed. no further pages will be requested."
                    );
                    anyhow!(S3mirrorError::Listing(format!(
                        "listing s3://{bucket}/{prefix} failed: {e:#}"
                    )))
                })?;
            page_number += 1;

            info!(
                page = page_number,
                fetched = page.objects.len(),
                backlog = self.stage.queue.len(),
                listed = self.stage.queue.put_count(),
                "fetched next page of source objects."
            );

            for object in page.objects {
                if self.stage.send(WorkItem::new(&object.key)).await? == SendResult::Closed {
                    debug!("work queue has been closed. list source objects has been stopped.");
                    return Ok(());
                }

                self.stage.stats_report.increment_listed();
                self.stage
                    .send_stats(ReplicationStatistics::ListComplete { key: object.key })
                    .await;
            }

            if page.is_last_page || page.next_marker.is_none() {
                break;
            }
            marker = page.next_marker;
        }

        debug!(
            pages = page_number,
            "list source objects has been completed."
        );
        Ok(())
    }

    /// Wait until the queue can take one more full page.
    ///
    /// Returns `false` if the run was cancelled or the queue closed meanwhile.
    async fn wait_for_headroom(&self) -> bool {
        let queue = &self.stage.queue;
        let threshold = queue
            .capacity()
            .saturating_sub(self.stage.config.max_keys as usize);
        let interval = Duration::from_millis(self.stage.config.backpressure_interval_milliseconds);

        loop {
            if self.stage.cancellation_token.is_cancelled() || queue.is_closed() {
                return false;
            }

            let backlog = queue.len();
            if backlog <= threshold {
                return true;
            }

            debug!(
                backlog = backlog,
                threshold = threshold,
                "work queue is near capacity. waiting before the next page."
            );

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.stage.cancellation_token.cancelled() => {
                    return false;
                }
            }
        }
    }
}
