use crate::config::args::value_parser::storage_path::{check_storage_path, parse_storage_path};
use crate::config::args::value_parser::url::check_scheme;
use crate::config::{
    CLITimeoutConfig, ClientConfig, Config, MAX_KEYS_LIMIT, QueueOrder, RetryConfig,
    SessionRefreshPolicy, SessionRetryConfig, TracingConfig,
};
use crate::types::{AccessKeys, S3Credentials};
use aws_smithy_types::checksum_config::RequestChecksumCalculation;
use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::ffi::OsString;

pub mod value_parser;


// ---------------------------------------------------------------------------
// Default constants
// ---------------------------------------------------------------------------

const DEFAULT_WORKER_SIZE: u16 = 20;
const DEFAULT_QUEUE_CAPACITY: usize = 5000;
const DEFAULT_MAX_KEYS: i32 = 1000;
const DEFAULT_BACKPRESSURE_INTERVAL_MILLISECONDS: u64 = 1000;
const DEFAULT_SESSION_REFRESH_INTERVAL: u64 = 1000;
const DEFAULT_REFRESH_SESSION_ON_ERROR: bool = false;
const DEFAULT_SESSION_RETRY_COUNT: u32 = 5;
const DEFAULT_SESSION_RETRY_INTERVAL_MILLISECONDS: u64 = 1000;
const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_WARN_AS_ERROR: bool = false;
const DEFAULT_FORCE_PATH_STYLE: bool = false;
const DEFAULT_DRY_RUN: bool = false;
const DEFAULT_SHOW_NO_PROGRESS: bool = false;
const DEFAULT_SKIP_ACL: bool = false;
const DEFAULT_SERVER_SIDE_ENCRYPTION: bool = false;
const DEFAULT_REDUCED_REDUNDANCY: bool = false;
const DEFAULT_DISABLE_STALLED_STREAM_PROTECTION: bool = false;

// ---------------------------------------------------------------------------
// Error messages
// ---------------------------------------------------------------------------

const ERROR_MESSAGE_WORKER_SIZE_ZERO: &str = "Worker size must be at least 1.";
const ERROR_MESSAGE_QUEUE_CAPACITY_ZERO: &str = "Queue capacity must be at least 1.";
const ERROR_MESSAGE_MAX_KEYS_OUT_OF_RANGE: &str = "Max keys must be between 1 and 1000.";
const ERROR_MESSAGE_SECRET_KEY_REQUIRED: &str =
    "--secret-key is required when --access-key is given.";

// ---------------------------------------------------------------------------
// CLIArgs (clap-derived argument struct)
// ---------------------------------------------------------------------------

/// s3mirror - Replicate objects from one S3 bucket to another.
///
/// Lists the source, compares each object with the target by digest and
/// copies new or changed objects server side, carrying ACL and storage class.
///
/// Example:
///   s3mirror s3://prod-assets s3://test-assets --dry-run
///   s3mirror prod-assets/img/ test-assets/img/ --worker-size 64 --skip-acl
///   s3mirror s3://logs s3://logs-archive --reduced-redundancy -v
#[derive(Parser, Clone, Debug)]
#[command(name = "s3mirror", version, about, long_about = None)]
pub struct CLIArgs {
    /// Source S3 path: [s3://]<BUCKET_NAME>[/prefix]
    #[arg(
        env,
        help = "[s3://]<BUCKET_NAME>[/prefix]",
        value_parser = check_storage_path,
        default_value_if("auto_complete_shell", clap::builder::ArgPredicate::IsPresent, "s3://ignored"),
        required = false,
    )]
    pub source: String,

    /// Target S3 path: [s3://]<BUCKET_NAME>[/prefix]
    #[arg(
        env,
        help = "[s3://]<BUCKET_NAME>[/prefix]",
        value_parser = check_storage_path,
        default_value_if("auto_complete_shell", clap::builder::ArgPredicate::IsPresent, "s3://ignored-target"),
        required = false,
    )]
    pub target: String,

    // -----------------------------------------------------------------------
    // General options
    // -----------------------------------------------------------------------
    /// Simulation mode. Compares objects but does not copy anything.
    #[arg(short = 'd', long, env, default_value_t = DEFAULT_DRY_RUN, help_heading = "General")]
    pub dry_run: bool,

    /// Don't show the progress bar.
    #[arg(long, env, default_value_t = DEFAULT_SHOW_NO_PROGRESS, help_heading = "General")]
    pub show_no_progress: bool,

    // -----------------------------------------------------------------------
    // Replication options
    // -----------------------------------------------------------------------
    /// Do not copy object ACLs to the target.
    #[arg(long, env, default_value_t = DEFAULT_SKIP_ACL, help_heading = "Replication")]
    pub skip_acl: bool,

    /// Request AES256 server-side encryption for copied objects.
    #[arg(long, env, default_value_t = DEFAULT_SERVER_SIDE_ENCRYPTION, help_heading = "Replication")]
    pub server_side_encryption: bool,

    /// Store copied objects as REDUCED_REDUNDANCY regardless of the source class.
    #[arg(long, env, default_value_t = DEFAULT_REDUCED_REDUNDANCY, help_heading = "Replication")]
    pub reduced_redundancy: bool,

    // -----------------------------------------------------------------------
    // Performance options
    // -----------------------------------------------------------------------
    /// Number of concurrent copy workers. Default: 20.
    #[arg(short = 't', long, env, default_value_t = DEFAULT_WORKER_SIZE, help_heading = "Performance")]
    pub worker_size: u16,

    /// Soft capacity of the work queue. Listing pauses while the queue is full. Default: 5000.
    #[arg(long, env, default_value_t = DEFAULT_QUEUE_CAPACITY, help_heading = "Performance")]
    pub queue_capacity: usize,

    /// Max keys per listing request. Default: 1000.
    #[arg(long, env, default_value_t = DEFAULT_MAX_KEYS, allow_negative_numbers = true, help_heading = "Performance")]
    pub max_keys: i32,

    /// Order in which queued objects are copied.
    #[arg(long, env, value_enum, default_value_t = QueueOrder::Fifo, help_heading = "Performance")]
    pub queue_order: QueueOrder,

    /// Interval in ms between queue checks while listing waits for room. Default: 1000.
    #[arg(long, env, default_value_t = DEFAULT_BACKPRESSURE_INTERVAL_MILLISECONDS, help_heading = "Performance")]
    pub backpressure_interval_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Session options
    // -----------------------------------------------------------------------
    /// Replace a worker's client session after this many objects. 0 never replaces it. Default: 1000.
    #[arg(long, env, default_value_t = DEFAULT_SESSION_REFRESH_INTERVAL, help_heading = "Session")]
    pub session_refresh_interval: u64,

    /// Replace a worker's client session after an object fails.
    #[arg(long, env, default_value_t = DEFAULT_REFRESH_SESSION_ON_ERROR, help_heading = "Session")]
    pub refresh_session_on_error: bool,

    /// Retries when a worker cannot build a client session. Default: 5.
    #[arg(long, env, default_value_t = DEFAULT_SESSION_RETRY_COUNT, help_heading = "Session")]
    pub session_retry_count: u32,

    /// Interval in ms between session construction retries. Default: 1000.
    #[arg(long, env, default_value_t = DEFAULT_SESSION_RETRY_INTERVAL_MILLISECONDS, help_heading = "Session")]
    pub session_retry_interval_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Logging options
    // -----------------------------------------------------------------------
    /// Verbosity level. -q (quiet), default (warn), -v, -vv, -vvv.
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Output logs in JSON format.
    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Logging")]
    pub json_tracing: bool,

    /// Enable AWS SDK tracing.
    #[arg(long, env, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Logging")]
    pub aws_sdk_tracing: bool,

    /// Enable tracing span events.
    #[arg(long, env, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Logging")]
    pub span_events_tracing: bool,

    /// Disable colored output in logs.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Logging")]
    pub disable_color_tracing: bool,

    // -----------------------------------------------------------------------
    // AWS configuration
    // -----------------------------------------------------------------------
    /// AWS profile used for both buckets. If not set, uses the default chain.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub aws_profile: Option<String>,

    /// AWS access key ID.
    #[arg(long, env, conflicts_with = "aws_profile", value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub access_key: Option<String>,

    /// AWS secret access key.
    #[arg(long, env, conflicts_with = "aws_profile", value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub secret_key: Option<String>,

    /// AWS session token.
    #[arg(long, env, conflicts_with = "aws_profile", value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub session_token: Option<String>,

    /// AWS region of the source bucket.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub source_region: Option<String>,

    /// AWS region of the target bucket.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub target_region: Option<String>,

    /// Custom S3-compatible endpoint URL for the source (e.g. MinIO).
    #[arg(long, env, value_parser = check_scheme, help_heading = "AWS")]
    pub source_endpoint_url: Option<String>,

    /// Custom S3-compatible endpoint URL for the target (e.g. MinIO).
    #[arg(long, env, value_parser = check_scheme, help_heading = "AWS")]
    pub target_endpoint_url: Option<String>,

    /// Force path-style access (required for some S3-compatible services).
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "AWS")]
    pub force_path_style: bool,

    /// Disable stalled stream protection.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_STALLED_STREAM_PROTECTION, help_heading = "AWS")]
    pub disable_stalled_stream_protection: bool,

    // -----------------------------------------------------------------------
    // Retry options
    // -----------------------------------------------------------------------
    /// Maximum retry attempts for AWS SDK operations. Default: 10.
    #[arg(long, env, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, help_heading = "Retry")]
    pub aws_max_attempts: u32,

    /// Initial backoff in milliseconds for retries. Default: 100.
    #[arg(long, env, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, help_heading = "Retry")]
    pub initial_backoff_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Timeout options
    // -----------------------------------------------------------------------
    /// Overall operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_timeout_milliseconds: Option<u64>,

    /// Per-attempt operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_attempt_timeout_milliseconds: Option<u64>,

    /// Connection timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub connect_timeout_milliseconds: Option<u64>,

    /// Read timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub read_timeout_milliseconds: Option<u64>,

    // -----------------------------------------------------------------------
    // Advanced options
    // -----------------------------------------------------------------------
    /// Treat warnings as errors (exit code 1 instead of 3).
    #[arg(long, env, default_value_t = DEFAULT_WARN_AS_ERROR, help_heading = "Advanced")]
    pub warn_as_error: bool,

    /// Generate shell completions.
    #[arg(long, env, help_heading = "Advanced")]
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

// ---------------------------------------------------------------------------
// parse_from_args (public API)
// ---------------------------------------------------------------------------

/// Parse command-line arguments into a `CLIArgs` struct.
///
/// # Example
///
/// ```
/// use s3mirror_rs::config::args::parse_from_args;
///
/// let args = vec!["s3mirror", "s3://prod-assets", "s3://test-assets", "--dry-run"];
/// let cli_args = parse_from_args(args).unwrap();
/// assert!(cli_args.dry_run);
/// ```
pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

/// Parse arguments and build a Config in one step.
pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    Config::try_from(cli_args)
}

// ---------------------------------------------------------------------------
// Validation and Config conversion
// ---------------------------------------------------------------------------

impl CLIArgs {
    fn validate(&self) -> Result<(), String> {
        if self.worker_size == 0 {
            return Err(ERROR_MESSAGE_WORKER_SIZE_ZERO.to_string());
        }
        if self.queue_capacity == 0 {
            return Err(ERROR_MESSAGE_QUEUE_CAPACITY_ZERO.to_string());
        }
        if self.max_keys < 1 || MAX_KEYS_LIMIT < self.max_keys {
            return Err(ERROR_MESSAGE_MAX_KEYS_OUT_OF_RANGE.to_string());
        }
        if self.access_key.is_some() && self.secret_key.is_none() {
            return Err(ERROR_MESSAGE_SECRET_KEY_REQUIRED.to_string());
        }
        Ok(())
    }

    fn build_credential(&self) -> S3Credentials {
        if let Some(ref profile) = self.aws_profile {
            S3Credentials::Profile(profile.clone())
        } else if let Some(ref access_key) = self.access_key {
            S3Credentials::Credentials {
                access_keys: AccessKeys {
                    access_key: access_key.clone(),
                    secret_access_key: self.secret_key.clone().unwrap_or_default(),
                    session_token: self.session_token.clone(),
                },
            }
        } else {
            S3Credentials::FromEnvironment
        }
    }

    /// Credentials, path style, retry and timeout settings are shared; region
    /// and endpoint are per side.
    fn build_client_config(
        &self,
        region: &Option<String>,
        endpoint_url: &Option<String>,
    ) -> ClientConfig {
        ClientConfig {
            credential: self.build_credential(),
            region: region.clone(),
            endpoint_url: endpoint_url.clone(),
            force_path_style: self.force_path_style,
            retry_config: RetryConfig {
                aws_max_attempts: self.aws_max_attempts,
                initial_backoff_milliseconds: self.initial_backoff_milliseconds,
            },
            cli_timeout_config: CLITimeoutConfig {
                operation_timeout_milliseconds: self.operation_timeout_milliseconds,
                operation_attempt_timeout_milliseconds: self.operation_attempt_timeout_milliseconds,
                connect_timeout_milliseconds: self.connect_timeout_milliseconds,
                read_timeout_milliseconds: self.read_timeout_milliseconds,
            },
            disable_stalled_stream_protection: self.disable_stalled_stream_protection,
            request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
        }
    }

    fn build_tracing_config(&self) -> Option<TracingConfig> {
        let log_level = self.verbosity.log_level()?;

        Some(TracingConfig {
            tracing_level: log_level,
            json_tracing: self.json_tracing,
            aws_sdk_tracing: self.aws_sdk_tracing,
            span_events_tracing: self.span_events_tracing,
            disable_color_tracing: self.disable_color_tracing,
        })
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(args: CLIArgs) -> Result<Self, Self::Error> {
        args.validate()?;

        let source = parse_storage_path(&args.source)?;
        let target = parse_storage_path(&args.target)?;
        let source_client_config =
            args.build_client_config(&args.source_region, &args.source_endpoint_url);
        let target_client_config =
            args.build_client_config(&args.target_region, &args.target_endpoint_url);
        let tracing_config = args.build_tracing_config();

        let config = Config {
            source,
            target,
            show_no_progress: args.show_no_progress,
            source_client_config: Some(source_client_config),
            target_client_config: Some(target_client_config),
            tracing_config,
            worker_size: args.worker_size,
            queue_capacity: args.queue_capacity,
            max_keys: args.max_keys,
            queue_order: args.queue_order,
            backpressure_interval_milliseconds: args.backpressure_interval_milliseconds,
            session_refresh_policy: SessionRefreshPolicy {
                refresh_every: args.session_refresh_interval,
                refresh_on_error: args.refresh_session_on_error,
            },
            session_retry_config: SessionRetryConfig {
                session_retry_count: args.session_retry_count,
                session_retry_interval_milliseconds: args.session_retry_interval_milliseconds,
            },
            skip_acl: args.skip_acl,
            server_side_encryption: args.server_side_encryption,
            reduced_redundancy: args.reduced_redundancy,
            dry_run: args.dry_run,
            warn_as_error: args.warn_as_error,
            auto_complete_shell: args.auto_complete_shell,
        };

        // Completion generation never touches the buckets.
        if config.auto_complete_shell.is_none() {
            config.validate().map_err(|e| e.to_string())?;
        }

        Ok(config)
    }
}
