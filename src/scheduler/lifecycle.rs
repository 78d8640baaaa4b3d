//! Host lifecycle bridge.
//!
//! The host process reports when it becomes foreground-active or inactive.
//! Going inactive cancels the polling loop; becoming active restarts it if
//! requests are still pending. The bridge only ever touches the loop handle,
//! never the active request set.

use crate::scheduler::request::Request;
use crate::scheduler::runner::{self, Shared};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Lifecycle notification from the host process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// Host became foreground-active.
    Active,
    /// Host went to the background or is stopping.
    Inactive,
}

/// Create a channel suitable for [`Poller::attach_lifecycle`](crate::scheduler::Poller::attach_lifecycle).
pub fn lifecycle_channel() -> (
    mpsc::UnboundedSender<LifecycleSignal>,
    mpsc::UnboundedReceiver<LifecycleSignal>,
) {
    mpsc::unbounded_channel()
}

/// Restart the loop if it is stopped and requests are pending.
/// Returns `true` when a loop was started.
pub(crate) fn became_active<R: Request>(shared: &Arc<Shared<R>>) -> bool {
    let mut state = shared.lock();
    info!(
        pending = state.requests.len(),
        running = state.is_running(),
        "host became active"
    );
    runner::ensure_running(shared, &mut state)
}

/// Cancel the running loop. Returns `true` when a loop was stopped.
pub(crate) fn became_inactive<R: Request>(shared: &Shared<R>) -> bool {
    let mut state = shared.lock();
    info!(running = state.is_running(), "host became inactive");
    runner::stop(&mut state)
}

/// Forward lifecycle signals to the scheduler until the source closes or the
/// subscription is cancelled.
pub(crate) async fn run_bridge<R: Request>(
    shared: Arc<Shared<R>>,
    mut signals: mpsc::UnboundedReceiver<LifecycleSignal>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("lifecycle bridge unsubscribed");
                break;
            }
            signal = signals.recv() => {
                match signal {
                    Some(LifecycleSignal::Active) => {
                        became_active(&shared);
                    }
                    Some(LifecycleSignal::Inactive) => {
                        became_inactive(&shared);
                    }
                    None => {
                        debug!("lifecycle source closed, bridge stopping");
                        break;
                    }
                }
            }
        }
    }
}
