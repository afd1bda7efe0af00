//! Readiness detection for freshly opened tasks.
//!
//! A probe loop issues one bounded GET against the task's redirect path,
//! then retries on a fixed interval until the service answers. Every
//! failure mode (non-2xx, timeout, connect error) is the same "not yet
//! ready". The loop runs under a per-task cancellation token so closing
//! the task or tearing the engine down stops it immediately, even with a
//! probe in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::TaskApi;
use crate::engine::EngineEvent;

/// Probe until the task's service answers or the token is cancelled.
///
/// The first attempt fires immediately; afterwards the interval timer
/// paces retries. Each tick awaits its probe before the next tick is
/// taken, so at most one probe per task is ever in flight.
pub async fn run_probe(
    api: Arc<dyn TaskApi>,
    name: String,
    timeout: Duration,
    interval: Duration,
    cancel: CancellationToken,
    events: mpsc::Sender<EngineEvent>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            outcome = api.probe_redirect(&name, timeout) => outcome,
        };

        match outcome {
            Ok(()) => {
                let _ = events.send(EngineEvent::ProbeReady { name }).await;
                return;
            }
            Err(err) => {
                debug!("probe_not_ready: {name}: {err}");
            }
        }
    }
}
