// Decides whether the progress line and the final summary are printed.

use s3mirror_rs::config::{Config, TracingConfig};

/// Live progress is hidden with `--show-no-progress`, above warn verbosity
/// (log lines take over the terminal) and with JSON logging.
pub fn is_progress_indicator_needed(config: &Config) -> bool {
    if config.show_no_progress {
        return false;
    }

    match config.tracing_config.as_ref() {
        None => true,
        Some(tracing_config) => {
            tracing_config.tracing_level <= log::Level::Warn && !tracing_config.json_tracing
        }
    }
}

/// The final summary is hidden with `--show-no-progress` and with JSON logging.
pub fn is_show_result_needed(config: &Config) -> bool {
    if config.show_no_progress {
        return false;
    }

    !config
        .tracing_config
        .as_ref()
        .is_some_and(|tracing_config: &TracingConfig| tracing_config.json_tracing)
}
