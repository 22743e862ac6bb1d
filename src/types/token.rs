/// A cancellation token used to signal pipeline shutdown.
///
/// Pass the token to
/// [`ReplicationPipeline::new`](crate::ReplicationPipeline::new) and call
/// [`cancel()`](tokio_util::sync::CancellationToken::cancel) on it to request a
/// graceful drain: the enumerator stops between pages, every worker finishes
/// its in-flight object and the remaining queued keys are abandoned.
pub type PipelineCancellationToken = tokio_util::sync::CancellationToken;

/// Create a new [`PipelineCancellationToken`].
///
/// ```
/// use s3mirror_rs::create_pipeline_cancellation_token;
///
/// let token = create_pipeline_cancellation_token();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
pub fn create_pipeline_cancellation_token() -> PipelineCancellationToken {
    tokio_util::sync::CancellationToken::new()
}
