/*!
# Overview
s3mirror-rs replicates the objects of one Amazon S3 bucket (optionally under a
prefix) into another bucket, skipping objects whose content digest already
matches on the target.

## Features
- **Concurrent**: a pool of copy workers fed from a bounded work queue
- **Incremental**: digest comparison skips objects that are already up to date
- **Faithful**: object ACLs, storage classes and server-side encryption are carried over
- **Backpressure**: listing pauses while the work queue is full
- **Library-First**: all CLI features are available as a Rust library

## As a Library
The s3mirror CLI is a thin wrapper over the s3mirror-rs library.

Example usage
=============

```toml
[dependencies]
s3mirror-rs = "0.1"
tokio = { version = "1", features = ["full"] }
```

```no_run
use s3mirror_rs::config::Config;
use s3mirror_rs::config::args::parse_from_args;
use s3mirror_rs::{ReplicationPipeline, create_pipeline_cancellation_token};

#[tokio::main]
async fn main() {
    let args = vec!["s3mirror", "s3://prod-assets", "s3://test-assets", "--dry-run"];

    let parsed_args = parse_from_args(args).unwrap();
    let config = Config::try_from(parsed_args).unwrap();
    let cancellation_token = create_pipeline_cancellation_token();
    let mut pipeline = ReplicationPipeline::new(config, cancellation_token).await;
    pipeline.close_stats_sender();
    pipeline.run().await;

    if pipeline.has_error() {
        eprintln!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
    }
    println!("{:?}", pipeline.get_replication_stats());
}
```
*/

#![allow(clippy::collapsible_if)]

pub mod config;
pub mod copier;
pub mod lister;
pub mod pipeline;
pub mod queue;
pub mod stage;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use config::args::CLIArgs;
pub use pipeline::ReplicationPipeline;
pub use types::error::{S3mirrorError, exit_code_from_error, is_cancelled_error};
pub use types::token::{PipelineCancellationToken, create_pipeline_cancellation_token};
pub use types::{ReplicationStatistics, ReplicationStats};
