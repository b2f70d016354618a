//! Background pool sampler.
//!
//! Runs only when the adapter was opened with `debug` and a Tokio runtime is
//! available. It holds a weak reference to the adapter state, so it can never
//! keep a closed adapter alive, and it exits at the first tick after the
//! adapter is dropped or on an explicit stop.

use super::adapter::Shared;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to a running sampler task.
#[derive(Debug)]
pub(crate) struct Sampler {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Sampler {
    /// Spawns the sampler on the current runtime, if there is one.
    pub(crate) fn spawn(shared: Weak<Shared>, interval: Duration) -> Option<Self> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let token = CancellationToken::new();
        let handle = runtime.spawn(run(shared, interval, token.clone()));
        tracing::debug!(interval_ms = interval.as_millis(), "Pool sampler started");
        Some(Self { token, handle })
    }

    /// Returns `true` once the task has exited.
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signals the task to exit and aborts it.
    pub(crate) fn stop(self) {
        self.handle.abort();
        tracing::debug!("Pool sampler stopped");
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run(shared: Weak<Shared>, interval: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                if !shared.sample_pool() {
                    break;
                }
            }
        }
    }
}
