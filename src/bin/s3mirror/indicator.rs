// Progress indicator.
//
// Reads ReplicationStatistics from the stats channel and keeps a one-line
// status up to date with a moving average of copied objects per second.

use std::io;
use std::io::Write;

use async_channel::Receiver;
use indicatif::{HumanBytes, HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use s3mirror_rs::types::ReplicationStatistics;
use simple_moving_average::{SMA, SumTreeSMA};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

/// Totals returned by [`show_indicator`] after the stats channel closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorSummary {
    pub total_listed_count: u64,
    pub total_copy_count: u64,
    pub total_copy_bytes: u64,
    pub total_skip_count: u64,
    pub total_error_count: u64,
    pub total_warning_count: u64,
}

impl IndicatorSummary {
    fn apply(&mut self, stats: ReplicationStatistics) -> u64 {
        match stats {
            ReplicationStatistics::ListComplete { .. } => {
                self.total_listed_count += 1;
            }
            ReplicationStatistics::CopyComplete { .. } => {
                self.total_copy_count += 1;
                return 1;
            }
            ReplicationStatistics::CopyBytes(size) => {
                self.total_copy_bytes += size;
            }
            ReplicationStatistics::CopySkip { .. } => {
                self.total_skip_count += 1;
            }
            ReplicationStatistics::CopyError { .. } => {
                self.total_error_count += 1;
            }
            ReplicationStatistics::CopyWarning { .. } => {
                self.total_warning_count += 1;
            }
        }
        0
    }

    fn progress_line(&self, objects_per_sec: u64) -> String {
        format!(
            "copied {:>3} objects | {:>3} objects/sec,  listed {} objects,  skipped {} objects,  error {} objects,  warning {} objects,  copied {:>3}",
            self.total_copy_count,
            HumanCount(objects_per_sec),
            self.total_listed_count,
            self.total_skip_count,
            self.total_error_count,
            self.total_warning_count,
            HumanBytes(self.total_copy_bytes),
        )
    }
}

/// Moving average window in seconds (samples).
const MOVING_AVERAGE_PERIOD_SECS: usize = 10;

/// How often (in seconds) to refresh the progress display.
const REFRESH_INTERVAL: f32 = 1.0;

/// Spawn a task that consumes the stats channel until it is closed.
///
/// `show_progress` controls the live line, `show_result` the final summary
/// line. In dry-run mode nothing is copied, so throughput is reported as 0.
pub fn show_indicator(
    stats_receiver: Receiver<ReplicationStatistics>,
    show_progress: bool,
    show_result: bool,
    dry_run: bool,
) -> JoinHandle<IndicatorSummary> {
    let progress_text = ProgressBar::new(0);
    if let Ok(progress_style) = ProgressStyle::with_template("{wide_msg}") {
        progress_text.set_style(progress_style);
    }

    tokio::spawn(async move {
        let start_time = Instant::now();

        let mut ma_copied_count = SumTreeSMA::<_, u64, MOVING_AVERAGE_PERIOD_SECS>::new();
        let mut summary = IndicatorSummary::default();

        loop {
            let mut period_count: u64 = 0;

            let period = Instant::now();
            loop {
                while let Ok(stats) = stats_receiver.try_recv() {
                    period_count += summary.apply(stats);
                }

                if REFRESH_INTERVAL < period.elapsed().as_secs_f32() {
                    break;
                }

                if stats_receiver.is_closed() && stats_receiver.is_empty() {
                    let elapsed = start_time.elapsed();
                    let elapsed_secs_f64 = elapsed.as_secs_f64();

                    let mut objects_per_sec =
                        (summary.total_copy_count as f64 / elapsed_secs_f64) as u64;
                    if elapsed_secs_f64 < REFRESH_INTERVAL as f64 {
                        objects_per_sec = summary.total_copy_count;
                    }
                    if dry_run {
                        objects_per_sec = 0;
                    }

                    info!(
                        message = "replication summary",
                        listed_objects = summary.total_listed_count,
                        copied_bytes = summary.total_copy_bytes,
                        copied_objects = summary.total_copy_count,
                        copied_objects_per_sec = objects_per_sec,
                        skipped = summary.total_skip_count,
                        error = summary.total_error_count,
                        warning = summary.total_warning_count,
                        duration_sec = elapsed_secs_f64,
                    );

                    if show_result {
                        if let Ok(style) = ProgressStyle::with_template("{msg}") {
                            progress_text.set_style(style);
                        }
                        progress_text.finish_with_message(format!(
                            "{},  duration {}",
                            summary.progress_line(objects_per_sec),
                            HumanDuration(elapsed),
                        ));

                        println!();
                        let _ = io::stdout().flush();
                    }

                    return summary;
                }

                tokio::time::sleep(std::time::Duration::from_secs_f32(0.05)).await;
            }

            if !dry_run {
                ma_copied_count.add_sample(period_count);
            }

            if show_progress {
                progress_text.set_message(summary.progress_line(ma_copied_count.get_average()));
            }
        }
    })
}
