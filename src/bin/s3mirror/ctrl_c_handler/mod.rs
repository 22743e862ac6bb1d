// Ctrl+C signal handler.
//
// Waits for either pipeline cancellation or Ctrl+C and cancels the pipeline on Ctrl+C.

use s3mirror_rs::PipelineCancellationToken;
use tokio::task::JoinHandle;
use tokio::{select, signal};
use tracing::{debug, warn};

pub fn spawn_ctrl_c_handler(cancellation_token: PipelineCancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        select! {
            _ = cancellation_token.cancelled() => {
                debug!("cancellation_token canceled.")
            }
            _ = signal::ctrl_c() => {
                warn!("ctrl-c received. finishing in-flight objects and abandoning the rest.");
                cancellation_token.cancel();
            }
        }
    })
}
