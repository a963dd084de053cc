//! Graceful shutdown signal (spec.md §5 "Cancellation and timeouts").
//!
//! Grounded on the teacher's `commands/run/shutdown.rs` ctrl_c handler; that
//! version polls flume queue depths before exiting. This crate's shutdown
//! fan-out is a `watch` channel instead of a queue drain — every long-lived
//! task (`ingest`, `sitrep`, `bridge`) selects on it directly, so there is no
//! separate drain loop to poll.

use tokio::sync::watch;
use tracing::info;

/// Spawns the ctrl_c listener; flips `shutdown_tx` to `true` once received.
/// Idempotent: a `watch` send of the same value is a no-op for any receiver
/// already past that edge.
pub fn spawn_shutdown_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown: received Ctrl+C, signaling all tasks to stop");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::error!("shutdown: unable to listen for signal: {}", e);
            }
        }
    });
}
