pub mod args;

use aws_smithy_types::checksum_config::RequestChecksumCalculation;

use crate::types::error::S3mirrorError;
use crate::types::{PathMapping, S3Credentials, StoragePath};

/// S3 API limit for keys returned by one ListObjectsV2 request.
pub const MAX_KEYS_LIMIT: i32 = 1000;

/// Run-scoped configuration shared by every pipeline component.
///
/// Built once (from [`CLIArgs`](args::CLIArgs) or programmatically) and then
/// cloned read-only into the enumerator and each worker.
///
/// # Quick Start
///
/// ```
/// use s3mirror_rs::Config;
///
/// let config = Config::for_buckets("prod-assets", "", "test-assets", "");
/// assert_eq!(config.worker_size, 20);
/// assert_eq!(config.queue_capacity, 5000);
/// ```
///
/// Then customize fields as needed:
///
/// ```
/// use s3mirror_rs::Config;
/// use s3mirror_rs::config::QueueOrder;
///
/// let mut config = Config::for_buckets("prod-assets", "img/", "test-assets", "img/");
/// config.skip_acl = true;
/// config.queue_order = QueueOrder::Lifo;
/// config.worker_size = 64;
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub source: StoragePath,
    pub target: StoragePath,
    pub show_no_progress: bool,
    pub source_client_config: Option<ClientConfig>,
    pub target_client_config: Option<ClientConfig>,
    pub tracing_config: Option<TracingConfig>,
    pub worker_size: u16,
    pub queue_capacity: usize,
    pub max_keys: i32,
    pub queue_order: QueueOrder,
    pub backpressure_interval_milliseconds: u64,
    pub session_refresh_policy: SessionRefreshPolicy,
    pub session_retry_config: SessionRetryConfig,
    // Replication options
    pub skip_acl: bool,
    pub server_side_encryption: bool,
    pub reduced_redundancy: bool,
    pub dry_run: bool,
    pub warn_as_error: bool,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

impl Config {
    /// Create a `Config` with production defaults for the given buckets and prefixes.
    ///
    /// Client configs are left unset; set them (or use the CLI) before running
    /// against real S3.
    pub fn for_buckets(
        source_bucket: &str,
        source_prefix: &str,
        target_bucket: &str,
        target_prefix: &str,
    ) -> Self {
        Config {
            source: StoragePath::S3 {
                bucket: source_bucket.to_string(),
                prefix: source_prefix.to_string(),
            },
            target: StoragePath::S3 {
                bucket: target_bucket.to_string(),
                prefix: target_prefix.to_string(),
            },
            ..Config::default()
        }
    }

    pub fn path_mapping(&self) -> PathMapping {
        PathMapping::new(self.source.prefix(), self.target.prefix())
    }

    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), S3mirrorError> {
        if self.source.bucket().is_empty() {
            return Err(S3mirrorError::InvalidUri(
                "source bucket name must not be empty.".to_string(),
            ));
        }
        if self.target.bucket().is_empty() {
            return Err(S3mirrorError::InvalidUri(
                "target bucket name must not be empty.".to_string(),
            ));
        }
        if self.source == self.target {
            return Err(S3mirrorError::InvalidConfig(
                "source and target must not be the same bucket and prefix.".to_string(),
            ));
        }
        // Listing is by string prefix, so either prefix starting with the other
        // means the run would enumerate objects it has just written.
        if self.source.bucket() == self.target.bucket() {
            let (source_prefix, target_prefix) = (self.source.prefix(), self.target.prefix());
            if source_prefix.starts_with(target_prefix) || target_prefix.starts_with(source_prefix)
            {
                return Err(S3mirrorError::InvalidConfig(
                    "source and target prefixes must not overlap in the same bucket.".to_string(),
                ));
            }
        }
        if self.worker_size == 0 {
            return Err(S3mirrorError::InvalidConfig(
                "worker size must be at least 1.".to_string(),
            ));
        }
        if self.max_keys < 1 || MAX_KEYS_LIMIT < self.max_keys {
            return Err(S3mirrorError::InvalidConfig(format!(
                "max keys must be between 1 and {MAX_KEYS_LIMIT}."
            )));
        }
        if self.queue_capacity < self.max_keys as usize {
            return Err(S3mirrorError::InvalidConfig(
                "queue capacity must be at least max keys.".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    /// Defaults match the CLI. Source and target are empty and must be set.
    fn default() -> Self {
        Config {
            source: StoragePath::S3 {
                bucket: String::new(),
                prefix: String::new(),
            },
            target: StoragePath::S3 {
                bucket: String::new(),
                prefix: String::new(),
            },
            show_no_progress: false,
            source_client_config: None,
            target_client_config: None,
            tracing_config: None,
            worker_size: 20,
            queue_capacity: 5000,
            max_keys: MAX_KEYS_LIMIT,
            queue_order: QueueOrder::Fifo,
            backpressure_interval_milliseconds: 1000,
            session_refresh_policy: SessionRefreshPolicy::default(),
            session_retry_config: SessionRetryConfig::default(),
            skip_acl: false,
            server_side_encryption: false,
            reduced_redundancy: false,
            dry_run: false,
            warn_as_error: false,
            auto_complete_shell: None,
        }
    }
}

/// Service order of the work queue. Copy decisions are independent per key,
/// so the order changes only which objects are replicated first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum QueueOrder {
    #[default]
    Fifo,
    Lifo,
}

/// When a worker replaces its client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRefreshPolicy {
    /// Replace the session after this many successfully handled objects. 0 disables.
    pub refresh_every: u64,
    /// Replace the session after an object failed.
    pub refresh_on_error: bool,
}

impl Default for SessionRefreshPolicy {
    fn default() -> Self {
        SessionRefreshPolicy {
            refresh_every: 1000,
            refresh_on_error: false,
        }
    }
}

/// Bounded retry of session construction inside a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRetryConfig {
    pub session_retry_count: u32,
    pub session_retry_interval_milliseconds: u64,
}

impl Default for SessionRetryConfig {
    fn default() -> Self {
        SessionRetryConfig {
            session_retry_count: 5,
            session_retry_interval_milliseconds: 1000,
        }
    }
}

/// AWS S3 client configuration for one side of the replication.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
    pub disable_stalled_stream_protection: bool,
    pub request_checksum_calculation: RequestChecksumCalculation,
}

/// Transport-level retry configuration handed to the AWS SDK.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

#[derive(Debug, Clone)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

/// Tracing (logging) configuration used by the binary's subscriber.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}
