//! Replication pipeline orchestrator.
//!
//! Spawns the [`ObjectLister`] and `worker_size` [`ObjectCopier`] workers
//! around one shared [`WorkQueue`], then waits on the queue's completion
//! barrier. Every task is spawned twice over so a panic is reported as an
//! error instead of tearing down the run.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_channel::{Receiver, Sender};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::copier::ObjectCopier;
use crate::lister::ObjectLister;
use crate::queue::WorkQueue;
use crate::stage::Stage;
use crate::storage::{self, StorageFactoryRef};
use crate::types::error::{S3mirrorError, is_cancelled_error};
use crate::types::token::PipelineCancellationToken;
use crate::types::{ReplicationStatistics, ReplicationStats, ReplicationStatsReport};

type TaskResult = Result<Result<()>, JoinError>;

/// The replication driver.
///
/// ## Pipeline
///
/// ```text
/// ObjectLister → WorkQueue (bounded, FIFO/LIFO) → ObjectCopier × worker_size
/// ```
///
/// ## Outcome
///
/// * The run ends when enumeration has finished (or failed) and every queued
///   key has been marked done, when every worker has exited, or on
///   cancellation. Keys still queued at that point are abandoned and counted.
/// * A listing failure, the loss of every worker and a panic are errors
///   ([`has_error`](Self::has_error)).
/// * Objects that failed individually set the warning flag
///   ([`has_warning`](Self::has_warning)); with `warn_as_error` they are
///   errors too.
///
/// ## Usage
///
/// ```no_run
/// # async fn example() {
/// # use s3mirror_rs::{Config, ReplicationPipeline, create_pipeline_cancellation_token};
/// # let config: Config = todo!();
/// let cancellation_token = create_pipeline_cancellation_token();
/// let mut pipeline = ReplicationPipeline::new(config, cancellation_token).await;
/// pipeline.close_stats_sender();
/// pipeline.run().await;
/// if pipeline.has_error() {
///     eprintln!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
/// }
/// println!("{:?}", pipeline.get_replication_stats());
/// # }
/// ```
pub struct ReplicationPipeline {
    config: Config,
    storage_factory: StorageFactoryRef,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<ReplicationStatistics>,
    stats_receiver: Receiver<ReplicationStatistics>,
    has_error: Arc<AtomicBool>,
    has_panic: Arc<AtomicBool>,
    has_warning: Arc<AtomicBool>,
    errors: Arc<Mutex<VecDeque<anyhow::Error>>>,
    ready: bool,
    replication_stats_report: Arc<ReplicationStatsReport>,
    queue: Option<Arc<WorkQueue>>,
}

impl ReplicationPipeline {
    /// Create a pipeline that talks to S3 using the client configs of `config`.
    pub async fn new(config: Config, cancellation_token: PipelineCancellationToken) -> Self {
        let storage_factory = storage::create_storage_factory(&config);
        Self::with_storage_factory(config, cancellation_token, storage_factory)
    }

    /// Create a pipeline over a custom session factory.
    pub fn with_storage_factory(
        config: Config,
        cancellation_token: PipelineCancellationToken,
        storage_factory: StorageFactoryRef,
    ) -> Self {
        let (stats_sender, stats_receiver) = async_channel::unbounded();

        Self {
            config,
            storage_factory,
            cancellation_token,
            stats_sender,
            stats_receiver,
            has_error: Arc::new(AtomicBool::new(false)),
            has_panic: Arc::new(AtomicBool::new(false)),
            has_warning: Arc::new(AtomicBool::new(false)),
            errors: Arc::new(Mutex::new(VecDeque::new())),
            ready: true,
            replication_stats_report: Arc::new(ReplicationStatsReport::new()),
            queue: None,
        }
    }

    /// Run the replication to completion.
    pub async fn run(&mut self) {
        assert!(self.ready, "ReplicationPipeline::run() called more than once");
        self.ready = false;

        if let Err(e) = self.config.validate() {
            error!("{}", e);
            self.record_error(anyhow!(e));
            self.shutdown();
            return;
        }

        self.execute_pipeline().await;
        self.shutdown();
    }

    /// Check if any error occurred during the pipeline execution.
    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::SeqCst)
    }

    /// Check if any spawned task panicked during the pipeline execution.
    pub fn has_panic(&self) -> bool {
        self.has_panic.load(Ordering::SeqCst)
    }

    /// Check if any warning occurred during the pipeline execution.
    pub fn has_warning(&self) -> bool {
        self.has_warning.load(Ordering::SeqCst)
    }

    /// Consume and return all accumulated errors.
    ///
    /// Returns `None` if no errors occurred.
    pub fn get_errors_and_consume(&self) -> Option<Vec<anyhow::Error>> {
        if !self.has_error() {
            return None;
        }
        let mut error_list = self.errors.lock().unwrap();
        let mut errors = Vec::with_capacity(error_list.len());
        while let Some(e) = error_list.pop_front() {
            errors.push(e);
        }
        Some(errors)
    }

    /// Get error messages without consuming them.
    ///
    /// Returns `None` if no errors occurred.
    pub fn get_error_messages(&self) -> Option<Vec<String>> {
        if !self.has_error() {
            return None;
        }
        let error_list = self.errors.lock().unwrap();
        Some(error_list.iter().map(|e| e.to_string()).collect())
    }

    /// Get the stats receiver for progress reporting.
    pub fn get_stats_receiver(&self) -> Receiver<ReplicationStatistics> {
        self.stats_receiver.clone()
    }

    /// Get a snapshot of the current replication statistics.
    pub fn get_replication_stats(&self) -> ReplicationStats {
        self.replication_stats_report.snapshot()
    }

    /// Number of keys put on the work queue and number marked done.
    ///
    /// `None` before the run started.
    pub fn get_queue_counts(&self) -> Option<(u64, u64)> {
        self.queue
            .as_ref()
            .map(|queue| (queue.put_count(), queue.done_count()))
    }

    /// Close the stats sender to signal the progress reporter to finish.
    ///
    /// Call this before `run()` if you don't need progress reporting,
    /// to free the stats channel resources.
    pub fn close_stats_sender(&self) {
        self.stats_sender.close();
    }

    // -----------------------------------------------------------------------
    // Internal methods
    // -----------------------------------------------------------------------

    async fn execute_pipeline(&mut self) {
        let queue = Arc::new(WorkQueue::new(
            self.config.queue_capacity,
            self.config.queue_order,
        ));
        self.queue = Some(queue.clone());

        // Cancelled by the user through the parent token, or by the driver
        // itself when every worker is gone.
        let run_token = self.cancellation_token.child_token();

        let mut lister_handle = self.spawn_lister(&queue, &run_token);
        let mut workers = self.spawn_workers(&queue, &run_token);

        info!(
            source = format!("s3://{}/{}", self.config.source.bucket(), self.config.source.prefix()),
            target = format!("s3://{}/{}", self.config.target.bucket(), self.config.target.prefix()),
            worker_size = self.config.worker_size,
            queue_capacity = queue.capacity(),
            queue_order = ?queue.order(),
            "replication has started."
        );

        let mut enumeration_done = false;
        loop {
            tokio::select! {
                result = &mut lister_handle, if !enumeration_done => {
                    enumeration_done = true;
                    self.handle_lister_result(flatten(result));
                }
                _ = queue.wait_until_drained(), if enumeration_done => {
                    debug!("all queued objects have been processed.");
                    break;
                }
                Some(joined) = workers.join_next() => {
                    self.handle_worker_result(flatten_worker(joined));

                    if workers.is_empty() {
                        if !run_token.is_cancelled() {
                            run_token.cancel();
                            queue.close();
                            let abandoned = queue.discard_pending();
                            self.replication_stats_report.add_abandoned(abandoned);

                            let e = S3mirrorError::WorkersExhausted { abandoned };
                            error!("{}", e);
                            self.record_error(anyhow!(e));
                        }
                        break;
                    }
                }
                _ = run_token.cancelled() => {
                    info!("replication has been cancelled. in-flight objects will be finished.");
                    break;
                }
            }
        }

        queue.close();

        if !enumeration_done {
            self.handle_lister_result(flatten(lister_handle.await));
        }
        while let Some(joined) = workers.join_next().await {
            self.handle_worker_result(flatten_worker(joined));
        }

        let abandoned = queue.discard_pending();
        if 0 < abandoned {
            self.replication_stats_report.add_abandoned(abandoned);
            warn!(
                abandoned = abandoned,
                "queued objects were abandoned before being processed."
            );
        }

        let stats = self.replication_stats_report.snapshot();
        info!(
            listed = stats.stats_listed_objects,
            copied = stats.stats_copied_objects,
            copied_bytes = stats.stats_copied_bytes,
            skipped = stats.stats_skipped_objects,
            failed = stats.stats_failed_objects,
            abandoned = stats.stats_abandoned_objects,
            "replication has been completed."
        );

        if self.config.warn_as_error && self.has_warning() {
            self.record_error(anyhow!(S3mirrorError::WarningsAsError {
                copied: stats.stats_copied_objects,
                failed: stats.stats_failed_objects,
            }));
        }
    }

    fn create_stage(&self, queue: &Arc<WorkQueue>, run_token: &PipelineCancellationToken) -> Stage {
        Stage::new(
            self.config.clone(),
            queue.clone(),
            dyn_clone::clone_box(&*self.storage_factory),
            run_token.clone(),
            self.stats_sender.clone(),
            self.replication_stats_report.clone(),
            self.has_warning.clone(),
        )
    }

    fn spawn_lister(
        &self,
        queue: &Arc<WorkQueue>,
        run_token: &PipelineCancellationToken,
    ) -> JoinHandle<TaskResult> {
        let lister = ObjectLister::new(self.create_stage(queue, run_token));

        tokio::spawn(async move { tokio::spawn(async move { lister.list_source().await }).await })
    }

    fn spawn_workers(
        &self,
        queue: &Arc<WorkQueue>,
        run_token: &PipelineCancellationToken,
    ) -> JoinSet<(u16, TaskResult)> {
        let mut workers = JoinSet::new();

        for worker_index in 0..self.config.worker_size {
            let mut object_copier = ObjectCopier::new(self.create_stage(queue, run_token), worker_index);

            workers.spawn(async move {
                let join_result = tokio::spawn(async move { object_copier.copy().await }).await;
                (worker_index, join_result)
            });
        }

        workers
    }

    fn handle_lister_result(&self, result: TaskResult) {
        match result {
            Ok(Ok(())) => {
                debug!("object lister completed successfully.");
            }
            Ok(Err(e)) => {
                // Already queued objects keep draining.
                error!("object lister failed: {:#}", e);
                self.record_error(e);
            }
            Err(e) => {
                self.has_panic.store(true, Ordering::SeqCst);
                error!("object lister task panicked: {}", e);
                self.record_error(anyhow!("object lister task panicked: {}", e));
            }
        }
    }

    fn handle_worker_result(&self, result: (Option<u16>, TaskResult)) {
        let (worker_index, result) = result;

        match result {
            Ok(Ok(())) => {
                debug!(worker_index, "copy worker completed successfully.");
            }
            Ok(Err(e)) if is_cancelled_error(&e) => {
                info!(worker_index, "copy worker cancelled.");
            }
            Ok(Err(e)) => {
                // The remaining workers take over its share of the queue.
                error!(worker_index, "copy worker failed: {:#}", e);
                self.has_warning.store(true, Ordering::SeqCst);
            }
            Err(e) => {
                self.has_panic.store(true, Ordering::SeqCst);
                error!(worker_index, "copy worker task panicked: {}", e);
                self.record_error(anyhow!("copy worker panicked: {}", e));
            }
        }
    }

    /// Record an error and set the error flag.
    fn record_error(&self, error: anyhow::Error) {
        self.has_error.store(true, Ordering::SeqCst);
        self.errors.lock().unwrap().push_back(error);
    }

    /// Shutdown: close stats sender.
    fn shutdown(&self) {
        self.close_stats_sender();
    }
}

/// Collapse the outer join error of a double-spawned task into the inner one.
fn flatten(result: Result<TaskResult, JoinError>) -> TaskResult {
    result.and_then(|inner| inner)
}

fn flatten_worker(joined: Result<(u16, TaskResult), JoinError>) -> (Option<u16>, TaskResult) {
    match joined {
        Ok((worker_index, result)) => (Some(worker_index), result),
        Err(e) => (None, Err(e)),
    }
}
