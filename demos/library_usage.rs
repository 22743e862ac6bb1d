//! Example: Using s3mirror-rs as a library.
//!
//! This example demonstrates how to:
//! 1. Build a [`Config`] from CLI-style arguments and adjust it in code
//! 2. Consume the statistics channel while the pipeline runs
//! 3. Run the [`ReplicationPipeline`] and inspect the aggregated result
//!
//! Run with:
//! ```sh
//! cargo run --example library_usage -- s3://prod-assets s3://test-assets --dry-run
//! ```

use anyhow::Result;
use s3mirror_rs::config::QueueOrder;
use s3mirror_rs::config::args::build_config_from_args;
use s3mirror_rs::{
    Config, ReplicationPipeline, ReplicationStatistics, create_pipeline_cancellation_token,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Same parser as the s3mirror binary. Config can also be built with
    //    `Config::for_buckets` and filled in by hand.
    let mut config: Config =
        build_config_from_args(std::env::args_os()).map_err(|e| anyhow::anyhow!(e))?;
    config.queue_order = QueueOrder::Lifo;

    // 2. Print copy events as they arrive.
    let token = create_pipeline_cancellation_token();
    let mut pipeline = ReplicationPipeline::new(config, token.clone()).await;
    let stats_receiver = pipeline.get_stats_receiver();
    let printer = tokio::spawn(async move {
        while let Ok(event) = stats_receiver.recv().await {
            match event {
                ReplicationStatistics::CopyComplete { key } => println!("  Copied:  {key}"),
                ReplicationStatistics::CopySkip { key } => println!("  Skipped: {key}"),
                ReplicationStatistics::CopyError { key } => eprintln!("  FAILED:  {key}"),
                _ => {}
            }
        }
    });

    // Ctrl+C stops listing and abandons queued objects.
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    // 3. Run to completion. run() closes the statistics channel when done.
    pipeline.run().await;
    printer.await?;

    let stats = pipeline.get_replication_stats();
    println!(
        "listed {}, copied {} ({} bytes), skipped {}, failed {}, abandoned {}",
        stats.stats_listed_objects,
        stats.stats_copied_objects,
        stats.stats_copied_bytes,
        stats.stats_skipped_objects,
        stats.stats_failed_objects,
        stats.stats_abandoned_objects,
    );

    if pipeline.has_error() {
        for message in pipeline.get_error_messages().unwrap_or_default() {
            eprintln!("error: {message}");
        }
        std::process::exit(1);
    }
    if pipeline.has_warning() {
        std::process::exit(3);
    }

    Ok(())
}
