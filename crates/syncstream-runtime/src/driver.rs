//! Async driver - runs stream processes as tokio tasks

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use syncstream_core::{SyncResult, Timestamp};
use syncstream_time::WallClock;

use crate::{ProcessStats, StreamEvent, StreamProcess};

/// Shared start time for streams launched together
///
/// One latency budget ahead of now, so the first samples are generated on
/// time by every stream.
pub fn shared_origin(wall: &dyn WallClock, latency: Duration) -> Timestamp {
    wall.now() + latency
}

/// Shutdown signal for a set of streams
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Tick `process` until it stops
///
/// Setting the shutdown flag (or dropping its sender) stops the stream
/// gracefully on the next tick.
pub async fn run_stream(
    mut process: StreamProcess,
    mut shutdown: watch::Receiver<bool>,
) -> SyncResult<ProcessStats> {
    let stream = process.stream();
    let mut shutdown_open = true;

    loop {
        if shutdown_open && *shutdown.borrow() {
            process.request_stop();
        }

        match process.tick() {
            Ok(events) => {
                for event in events {
                    if let StreamEvent::StateChanged(state) = event {
                        tracing::trace!(%stream, %state, "driver observed state change");
                    }
                }
            }
            Err(e) => {
                tracing::error!(%stream, "stream failed: {}", e);
                return Err(e);
            }
        }

        if process.is_stopped() {
            return Ok(process.stats().clone());
        }

        let delay = process.next_delay();
        if delay.is_zero() {
            tokio::task::yield_now().await;
            continue;
        }

        if shutdown_open {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Sender gone: treat as shutdown.
                        shutdown_open = false;
                        process.request_stop();
                    }
                }
            }
        } else {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Spawn one task per process
pub fn spawn_streams(
    processes: Vec<StreamProcess>,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<SyncResult<ProcessStats>>> {
    processes
        .into_iter()
        .map(|process| {
            tracing::debug!(stream = %process.stream(), "spawning stream task");
            tokio::spawn(run_stream(process, shutdown.clone()))
        })
        .collect()
}
