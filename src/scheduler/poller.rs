//! Public polling façade.
//!
//! [`Poller`] owns the request registry, the fetcher registry, the tick clock
//! and the lifecycle subscription. It is constructed explicitly and passed to
//! whoever needs it; there is no process-wide instance.

use crate::config::PollerConfig;
use crate::scheduler::clock::{Clock, Stopwatch};
use crate::scheduler::lifecycle::{self, LifecycleSignal};
use crate::scheduler::request::{Fetcher, Request, RequestKind};
use crate::scheduler::runner::{self, SchedulerState, Shared};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Lifecycle-aware periodic polling scheduler.
pub struct Poller<R: Request> {
    shared: Arc<Shared<R>>,
    /// Cancels the current lifecycle bridge task, if one is attached.
    lifecycle: Mutex<Option<CancellationToken>>,
}

impl<R: Request> std::fmt::Debug for Poller<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Poller")
            .field("active", &state.requests.len())
            .field("running", &state.is_running())
            .field("handlers", &state.handlers)
            .finish()
    }
}

impl<R: Request> Poller<R> {
    /// Create a stopped poller that spawns its loop and fetches on `tokio_handle`.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Config`](crate::PollError::Config) if `config` is invalid.
    pub fn new(config: PollerConfig, tokio_handle: tokio::runtime::Handle) -> crate::Result<Self> {
        config.validate()?;
        let clock = Stopwatch::from_config(&config);
        Ok(Self {
            shared: Arc::new(Shared::new(
                Box::new(clock),
                config.tick_interval(),
                tokio_handle,
            )),
            lifecycle: Mutex::new(None),
        })
    }

    /// Replace the tick clock.
    pub fn with_clock(self, clock: impl Clock + 'static) -> Self {
        self.shared.lock().clock = Box::new(clock);
        self
    }

    /// Bind `fetcher` to `kind`. Must happen before requests of that kind are
    /// submitted. Returns `true` when an earlier binding was replaced.
    pub fn register(&self, kind: RequestKind, fetcher: Arc<dyn Fetcher<R>>) -> bool {
        let replaced = self.shared.lock().handlers.register(kind, fetcher);
        if replaced {
            info!(kind = %kind, "replaced fetcher");
        } else {
            info!(kind = %kind, "registered fetcher");
        }
        replaced
    }

    /// Start polling `requests` and make sure the loop is running.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::UnregisteredHandler`](crate::PollError::UnregisteredHandler)
    /// if any request's kind has no fetcher. The whole batch is rejected in
    /// that case and nothing is added.
    pub fn request(&self, requests: &[R]) -> crate::Result<()> {
        let mut state = self.shared.lock();
        let SchedulerState {
            requests: registry,
            handlers,
            ..
        } = &mut *state;
        let added = registry.add(handlers, requests)?;
        for request in &added {
            info!(kind = %request.kind(), "accepting {request:?}");
        }
        if added.len() < requests.len() {
            debug!(
                skipped = requests.len() - added.len(),
                "requests already active, wait counters kept"
            );
        }

        runner::ensure_running(&self.shared, &mut state);
        Ok(())
    }

    /// Stop polling `requests`. The loop is not stopped here; it exits on its
    /// next tick if nothing is left. An in-flight fetch is not aborted.
    pub fn cancel(&self, requests: &[R]) {
        let mut state = self.shared.lock();
        for request in requests {
            info!(kind = %request.kind(), "removing {request:?}");
        }
        state.requests.remove(requests);
    }

    /// Host became foreground-active. Returns `true` when a loop was started.
    pub fn on_active(&self) -> bool {
        lifecycle::became_active(&self.shared)
    }

    /// Host became inactive. Returns `true` when a running loop was stopped.
    pub fn on_inactive(&self) -> bool {
        lifecycle::became_inactive(&self.shared)
    }

    /// Subscribe to a lifecycle signal source. Replaces any earlier subscription.
    pub fn attach_lifecycle(&self, signals: mpsc::UnboundedReceiver<LifecycleSignal>) {
        let cancel = CancellationToken::new();
        let previous = self
            .lifecycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(cancel.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        self.shared.runtime().spawn(lifecycle::run_bridge(
            Arc::clone(&self.shared),
            signals,
            cancel,
        ));
    }

    /// Unsubscribe from lifecycle signals and stop the loop. Requests stay
    /// registered; a later [`request`](Self::request) or
    /// [`on_active`](Self::on_active) starts polling again.
    pub fn shutdown(&self) {
        if let Some(cancel) = self
            .lifecycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            cancel.cancel();
        }
        runner::stop(&mut self.shared.lock());
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().is_running()
    }

    /// Number of requests currently being polled.
    pub fn active_len(&self) -> usize {
        self.shared.lock().requests.len()
    }

    pub fn is_active(&self, request: &R) -> bool {
        self.shared.lock().requests.contains(request)
    }

    /// Time units credited to `request` since its last dispatch.
    pub fn wait_of(&self, request: &R) -> Option<u64> {
        self.shared.lock().requests.wait_of(request)
    }

    /// Whether a fetch for `request` has been dispatched and not yet finished.
    pub fn is_in_flight(&self, request: &R) -> bool {
        self.shared.lock().requests.is_in_flight(request)
    }
}

impl<R: Request> Drop for Poller<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
