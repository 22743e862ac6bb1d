//! Copy workers of the replication pipeline.
//!
//! Each [`ObjectCopier`] owns a private client session ([`WorkerState`]),
//! pulls keys from the shared work queue, decides copy-or-skip by digest and
//! copies with storage class, encryption and ACL propagation. Per-object
//! failures are typed ([`ObjectCopyError`]), logged, counted and never stop
//! the worker. Only the inability to build a session ends a worker early.

use anyhow::{Result, anyhow};
use tracing::{debug, error, info, warn};

use crate::queue::ClaimedItem;
use crate::stage::Stage;
use crate::storage::Storage;
use crate::types::error::{ObjectCopyError, is_cancelled_error};
use crate::types::{ObjectRef, PathMapping, ReplicationStatistics};

pub mod decision;
pub mod session;

pub use decision::{CopyDecision, decide_copy, resolve_storage_class};
pub use session::WorkerState;

/// What happened to one object.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationOutcome {
    Copied { bytes: u64, decision: CopyDecision },
    /// Dry run: the object would have been copied.
    WouldCopy { bytes: u64, decision: CopyDecision },
    SkippedIdentical,
    /// Listed, but gone by the time it was described.
    SourceMissing,
}

/// Pipeline worker that copies queued objects from source to target.
pub struct ObjectCopier {
    worker_index: u16,
    base: Stage,
    state: WorkerState,
    path_mapping: PathMapping,
}

impl ObjectCopier {
    pub fn new(base: Stage, worker_index: u16) -> Self {
        let state = WorkerState::new(base.config.session_refresh_policy);
        let path_mapping = base.config.path_mapping();

        Self {
            worker_index,
            base,
            state,
            path_mapping,
        }
    }

    /// Main entry point: take keys from the queue until it is closed or the
    /// run is cancelled.
    ///
    /// Returns an error only when no session could be built.
    pub async fn copy(&mut self) -> Result<()> {
        debug!(worker_index = self.worker_index, "copy worker started.");
        self.receive_and_copy().await
    }

    async fn receive_and_copy(&mut self) -> Result<()> {
        loop {
            if self.state.needs_refresh() {
                if let Err(e) = self
                    .state
                    .refresh(
                        self.worker_index,
                        &self.base.storage_factory,
                        &self.base.config.session_retry_config,
                        &self.base.cancellation_token,
                    )
                    .await
                {
                    if is_cancelled_error(&e) {
                        info!(worker_index = self.worker_index, "copy worker has been cancelled.");
                        return Ok(());
                    }

                    error!(
                        worker_index = self.worker_index,
                        error = format!("{e:#}"),
                        "copy worker is exiting because no session could be built."
                    );
                    return Err(e);
                }
            }

            tokio::select! {
                claimed = self.base.queue.get() => {
                    match claimed {
                        Some(claimed) => self.process_item(claimed).await,
                        None => {
                            debug!(worker_index = self.worker_index, "copy worker has been completed.");
                            break;
                        }
                    }
                },
                _ = self.base.cancellation_token.cancelled() => {
                    info!(worker_index = self.worker_index, "copy worker has been cancelled.");
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    /// Handle one claimed key and always mark it done.
    async fn process_item(&mut self, claimed: ClaimedItem) {
        let key = claimed.key().to_string();

        let result = match self.state.storage() {
            Some(storage) => self.replicate_object(storage, &key).await,
            None => Err(ObjectCopyError::Session {
                key: key.clone(),
                cause: anyhow!("worker has no session."),
            }),
        };

        match result {
            Ok(outcome) => {
                self.state.record_success();
                self.record_outcome(&key, outcome).await;
            }
            Err(e) => {
                self.state.record_failure();
                self.record_failure(&key, e).await;
            }
        }

        claimed.complete();
    }

    /// Describe, decide and copy a single source key.
    pub async fn replicate_object(
        &self,
        storage: &Storage,
        key: &str,
    ) -> Result<ReplicationOutcome, ObjectCopyError> {
        let config = &self.base.config;
        let target_key = self.path_mapping.map_key(key);
        let source_ref = ObjectRef::new(config.source.bucket(), key);
        let target_ref = ObjectRef::new(config.target.bucket(), &target_key);

        let source = storage
            .get_descriptor(&source_ref.bucket, &source_ref.key)
            .await
            .map_err(|cause| ObjectCopyError::DescribeSource {
                key: source_ref.to_string(),
                cause,
            })?;
        if !source.exists {
            return Ok(ReplicationOutcome::SourceMissing);
        }

        let target = storage
            .get_descriptor(&target_ref.bucket, &target_ref.key)
            .await
            .map_err(|cause| ObjectCopyError::DescribeTarget {
                key: target_ref.to_string(),
                cause,
            })?;

        let decision = decide_copy(&source, &target);
        if !decision.should_copy() {
            return Ok(ReplicationOutcome::SkippedIdentical);
        }

        let storage_class = resolve_storage_class(&source, config.reduced_redundancy);

        if config.dry_run {
            info!(
                worker_index = self.worker_index,
                source_key = key,
                target_key = target_key,
                decision = ?decision,
                storage_class = storage_class.as_ref().map(|class| class.as_str()),
                size = source.size,
                "[dry-run] object would be copied."
            );
            return Ok(ReplicationOutcome::WouldCopy {
                bytes: source.size,
                decision,
            });
        }

        storage
            .copy_object(
                &target_ref,
                &source_ref,
                storage_class.clone(),
                config.server_side_encryption,
            )
            .await
            .map_err(|cause| ObjectCopyError::Copy {
                source_key: source_ref.to_string(),
                target_key: target_ref.to_string(),
                cause,
            })?;

        if !config.skip_acl {
            let acl = storage
                .get_acl(&source_ref.bucket, &source_ref.key)
                .await
                .map_err(|cause| ObjectCopyError::GetAcl {
                    key: source_ref.to_string(),
                    cause,
                })?;

            storage
                .set_acl(&target_ref.bucket, &target_ref.key, &acl)
                .await
                .map_err(|cause| ObjectCopyError::SetAcl {
                    key: target_ref.to_string(),
                    cause,
                })?;
        }

        info!(
            worker_index = self.worker_index,
            source_key = key,
            target_key = target_key,
            decision = ?decision,
            storage_class = storage_class.as_ref().map(|class| class.as_str()),
            size = source.size,
            "object has been copied."
        );

        Ok(ReplicationOutcome::Copied {
            bytes: source.size,
            decision,
        })
    }

    async fn record_outcome(&self, key: &str, outcome: ReplicationOutcome) {
        let report = &self.base.stats_report;

        match outcome {
            ReplicationOutcome::Copied { bytes, .. } | ReplicationOutcome::WouldCopy { bytes, .. } => {
                report.increment_copied(bytes);
                self.base
                    .send_stats(ReplicationStatistics::CopyBytes(bytes))
                    .await;
                self.base
                    .send_stats(ReplicationStatistics::CopyComplete {
                        key: key.to_string(),
                    })
                    .await;
            }
            ReplicationOutcome::SkippedIdentical => {
                debug!(
                    worker_index = self.worker_index,
                    key = key,
                    "object is identical at the target. skipped."
                );
                report.increment_skipped();
                self.base
                    .send_stats(ReplicationStatistics::CopySkip {
                        key: key.to_string(),
                    })
                    .await;
            }
            ReplicationOutcome::SourceMissing => {
                warn!(
                    worker_index = self.worker_index,
                    key = key,
                    "source object no longer exists. skipped."
                );
                report.increment_skipped();
                self.base
                    .send_stats(ReplicationStatistics::CopyWarning {
                        key: key.to_string(),
                    })
                    .await;
            }
        }
    }

    async fn record_failure(&self, key: &str, e: ObjectCopyError) {
        warn!(
            worker_index = self.worker_index,
            key = key,
            after_copy = e.is_after_copy(),
            error = e.to_string(),
            "failed to replicate object."
        );

        self.base.stats_report.increment_failed();
        self.base
            .send_stats(ReplicationStatistics::CopyError {
                key: key.to_string(),
            })
            .await;
        self.base.set_warning();
    }
}
