//! Scheduler background loop.
//!
//! Spawns a tokio task that, once per tick period, credits elapsed time to
//! every active request and dispatches the ones that are due. The loop exits
//! on its own when the active set drains, and is cancelled externally when
//! the host process goes inactive.
//!
//! All shared state lives behind one mutex. The loop's emptiness check and
//! the clearing of its handle happen under that lock, as does the façade's
//! add-then-start, so a request can never be accepted into a loop that has
//! already decided to exit.

use crate::scheduler::clock::Clock;
use crate::scheduler::handlers::HandlerRegistry;
use crate::scheduler::registry::RequestRegistry;
use crate::scheduler::request::{Fetcher, Request};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The single in-flight loop instance.
#[derive(Debug)]
struct LoopHandle {
    generation: u64,
    cancel: CancellationToken,
}

/// State mutated by both the façade and the loop.
pub(crate) struct SchedulerState<R: Request> {
    pub(crate) requests: RequestRegistry<R>,
    pub(crate) handlers: HandlerRegistry<R>,
    pub(crate) clock: Box<dyn Clock>,
    loop_handle: Option<LoopHandle>,
    next_generation: u64,
}

impl<R: Request> SchedulerState<R> {
    pub(crate) fn is_running(&self) -> bool {
        self.loop_handle.is_some()
    }

    /// Clear the handle if it still belongs to `generation`.
    fn release(&mut self, generation: u64) {
        if self
            .loop_handle
            .as_ref()
            .is_some_and(|handle| handle.generation == generation)
        {
            self.loop_handle = None;
        }
    }
}

/// Shared core owned by the façade and every loop / fetch task.
pub(crate) struct Shared<R: Request> {
    state: Mutex<SchedulerState<R>>,
    tick_interval: Duration,
    runtime: tokio::runtime::Handle,
}

impl<R: Request> Shared<R> {
    pub(crate) fn new(
        clock: Box<dyn Clock>,
        tick_interval: Duration,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                requests: RequestRegistry::new(),
                handlers: HandlerRegistry::new(),
                clock,
                loop_handle: None,
                next_generation: 0,
            }),
            tick_interval,
            runtime,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SchedulerState<R>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn runtime(&self) -> &tokio::runtime::Handle {
        &self.runtime
    }
}

/// Start a loop unless one is already running or there is nothing to poll.
/// Returns `true` when a new loop was spawned.
pub(crate) fn ensure_running<R: Request>(
    shared: &Arc<Shared<R>>,
    state: &mut SchedulerState<R>,
) -> bool {
    if state.loop_handle.is_some() || state.requests.is_empty() {
        return false;
    }

    let generation = state.next_generation;
    state.next_generation = state.next_generation.wrapping_add(1);
    let cancel = CancellationToken::new();
    state.loop_handle = Some(LoopHandle {
        generation,
        cancel: cancel.clone(),
    });

    shared
        .runtime
        .spawn(run_loop(Arc::clone(shared), generation, cancel));
    true
}

/// Cancel the running loop, if any, and clear its handle.
/// In-flight fetches are left to finish. Returns `true` when a loop was stopped.
pub(crate) fn stop<R: Request>(state: &mut SchedulerState<R>) -> bool {
    match state.loop_handle.take() {
        Some(handle) => {
            handle.cancel.cancel();
            info!(generation = handle.generation, "polling stop requested");
            true
        }
        None => false,
    }
}

/// Result of one scheduler tick.
pub(crate) enum TickOutcome<R: Request> {
    /// Tick completed; these fetches were claimed and must be spawned.
    Dispatch(Vec<(R, Arc<dyn Fetcher<R>>)>),
    /// Active set was empty; the loop handle has been released.
    Drained,
    /// The loop was cancelled before this tick ran.
    Cancelled,
    /// The clock failed; the loop handle has been released.
    Failed(crate::PollError),
}

/// Execute one tick: credit elapsed time, then claim every due request.
pub(crate) fn tick<R: Request>(
    shared: &Shared<R>,
    generation: u64,
    cancel: &CancellationToken,
) -> TickOutcome<R> {
    let mut state = shared.lock();

    if cancel.is_cancelled() {
        return TickOutcome::Cancelled;
    }

    if state.requests.is_empty() {
        state.release(generation);
        return TickOutcome::Drained;
    }

    let elapsed = match state.clock.elapsed_units() {
        Ok(units) => units,
        Err(e) => {
            state.release(generation);
            return TickOutcome::Failed(e);
        }
    };
    debug!(elapsed, active = state.requests.len(), "tick");

    state.requests.accumulate(elapsed);

    let due = state.requests.due();
    let mut batch = Vec::with_capacity(due.len());
    for request in due {
        let Some(fetcher) = state.handlers.lookup(request.kind()) else {
            continue;
        };
        if state.requests.begin_dispatch(&request) {
            batch.push((request, fetcher));
        } else if state.requests.is_in_flight(&request) {
            debug!(kind = %request.kind(), "skipping {request:?}: previous fetch still running");
        }
    }

    TickOutcome::Dispatch(batch)
}

async fn run_loop<R: Request>(shared: Arc<Shared<R>>, generation: u64, cancel: CancellationToken) {
    info!(generation, "polling started");

    loop {
        match tick(&shared, generation, &cancel) {
            TickOutcome::Dispatch(batch) => {
                for (request, fetcher) in batch {
                    spawn_fetch(&shared, request, fetcher);
                }
            }
            TickOutcome::Drained => {
                info!(generation, "no active requests, polling stopped");
                return;
            }
            TickOutcome::Cancelled => {
                info!(generation, "polling cancelled");
                return;
            }
            TickOutcome::Failed(e) => {
                error!(generation, "polling loop failed: {e}");
                return;
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                info!(generation, "polling cancelled");
                return;
            }
            _ = tokio::time::sleep(shared.tick_interval) => {}
        }
    }
}

/// Run one fetch on its own task. Failures stay inside that task.
pub(crate) fn spawn_fetch<R: Request>(
    shared: &Arc<Shared<R>>,
    request: R,
    fetcher: Arc<dyn Fetcher<R>>,
) {
    let guard = InFlightGuard {
        shared: Arc::clone(shared),
        request: request.clone(),
    };

    shared.runtime.spawn(async move {
        let _guard = guard;
        debug!(kind = %request.kind(), "fetching {request:?}");
        let kind = request.kind();
        let label = format!("{request:?}");
        if let Err(e) = fetcher.fetch(request).await {
            warn!(kind = %kind, "fetch failed for {label}: {e:#}");
        }
    });
}

/// Clears the in-flight mark when a fetch task ends, including by panic.
struct InFlightGuard<R: Request> {
    shared: Arc<Shared<R>>,
    request: R,
}

impl<R: Request> Drop for InFlightGuard<R> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!(kind = %self.request.kind(), "fetch panicked for {:?}", self.request);
        }
        self.shared.lock().requests.finish_dispatch(&self.request);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::scheduler::request::RequestKind;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Ping(u64);

    impl Request for Ping {
        fn kind(&self) -> RequestKind {
            RequestKind::new("ping")
        }

        fn interval(&self) -> u64 {
            self.0
        }
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl Fetcher<Ping> for Counting {
        async fn fetch(&self, _request: Ping) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Replays scripted elapsed values; `None` reports a clock failure.
    struct ScriptedClock(VecDeque<Option<u64>>);

    impl Clock for ScriptedClock {
        fn elapsed_units(&mut self) -> crate::Result<u64> {
            match self.0.pop_front() {
                Some(Some(units)) => Ok(units),
                Some(None) => Err(crate::PollError::Clock("clock unavailable".to_owned())),
                None => Ok(1),
            }
        }
    }

    fn shared(script: Vec<Option<u64>>) -> (Arc<Shared<Ping>>, Arc<AtomicUsize>) {
        let shared = Arc::new(Shared::new(
            Box::new(ScriptedClock(script.into())),
            Duration::from_secs(1),
            tokio::runtime::Handle::current(),
        ));
        let calls = Arc::new(AtomicUsize::new(0));
        shared
            .lock()
            .handlers
            .register(RequestKind::new("ping"), Arc::new(Counting(Arc::clone(&calls))));
        (shared, calls)
    }

    fn dispatched(outcome: TickOutcome<Ping>) -> Vec<Ping> {
        match outcome {
            TickOutcome::Dispatch(batch) => batch.into_iter().map(|(r, _)| r).collect(),
            _ => panic!("expected a dispatch tick"),
        }
    }

    fn add(shared: &Shared<Ping>, request: Ping) {
        let mut state = shared.lock();
        let SchedulerState {
            requests, handlers, ..
        } = &mut *state;
        requests.add(handlers, &[request]).unwrap();
    }

    #[tokio::test]
    async fn tick_on_empty_set_drains_and_releases_handle() {
        let (shared, _calls) = shared(vec![]);
        let cancel = CancellationToken::new();
        shared.lock().loop_handle = Some(LoopHandle {
            generation: 3,
            cancel: cancel.clone(),
        });

        assert!(matches!(tick(&shared, 3, &cancel), TickOutcome::Drained));
        assert!(!shared.lock().is_running());
    }

    #[tokio::test]
    async fn stale_generation_does_not_clear_newer_handle() {
        let (shared, _calls) = shared(vec![]);
        let cancel = CancellationToken::new();
        shared.lock().loop_handle = Some(LoopHandle {
            generation: 4,
            cancel: CancellationToken::new(),
        });

        assert!(matches!(tick(&shared, 3, &cancel), TickOutcome::Drained));
        assert!(shared.lock().is_running());
    }

    #[tokio::test]
    async fn interval_governs_redispatch() {
        let (shared, _calls) = shared(vec![Some(0), Some(1), Some(1), Some(1)]);
        let cancel = CancellationToken::new();
        add(&shared, Ping(3));

        assert_eq!(dispatched(tick(&shared, 0, &cancel)), vec![Ping(3)]);
        shared.lock().requests.finish_dispatch(&Ping(3));
        assert!(dispatched(tick(&shared, 0, &cancel)).is_empty());
        assert!(dispatched(tick(&shared, 0, &cancel)).is_empty());
        assert_eq!(dispatched(tick(&shared, 0, &cancel)), vec![Ping(3)]);
        assert_eq!(shared.lock().requests.wait_of(&Ping(3)), Some(0));
    }

    #[tokio::test]
    async fn irregular_elapsed_is_credited_in_full() {
        let (shared, _calls) = shared(vec![Some(0), Some(4)]);
        let cancel = CancellationToken::new();
        add(&shared, Ping(4));

        assert_eq!(dispatched(tick(&shared, 0, &cancel)).len(), 1);
        shared.lock().requests.finish_dispatch(&Ping(4));
        assert_eq!(dispatched(tick(&shared, 0, &cancel)), vec![Ping(4)]);
    }

    #[tokio::test]
    async fn in_flight_request_waits_for_its_fetch() {
        let (shared, _calls) = shared(vec![Some(0), Some(5), Some(1)]);
        let cancel = CancellationToken::new();
        add(&shared, Ping(2));

        assert_eq!(dispatched(tick(&shared, 0, &cancel)).len(), 1);
        assert!(dispatched(tick(&shared, 0, &cancel)).is_empty());
        assert_eq!(shared.lock().requests.wait_of(&Ping(2)), Some(5));

        shared.lock().requests.finish_dispatch(&Ping(2));
        assert_eq!(dispatched(tick(&shared, 0, &cancel)), vec![Ping(2)]);
    }

    #[tokio::test]
    async fn clock_failure_is_fatal_to_the_loop_instance() {
        let (shared, _calls) = shared(vec![None]);
        let cancel = CancellationToken::new();
        add(&shared, Ping(1));
        shared.lock().loop_handle = Some(LoopHandle {
            generation: 0,
            cancel: cancel.clone(),
        });

        assert!(matches!(
            tick(&shared, 0, &cancel),
            TickOutcome::Failed(crate::PollError::Clock(_))
        ));
        assert!(!shared.lock().is_running());
        assert_eq!(shared.lock().requests.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_tick_dispatches_nothing() {
        let (shared, _calls) = shared(vec![]);
        let cancel = CancellationToken::new();
        add(&shared, Ping(0));
        cancel.cancel();

        assert!(matches!(tick(&shared, 0, &cancel), TickOutcome::Cancelled));
        assert_eq!(shared.lock().requests.wait_of(&Ping(0)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_running_is_idempotent() {
        let (shared, _calls) = shared(vec![]);
        {
            let mut state = shared.lock();
            assert!(!ensure_running(&shared, &mut state));
        }
        add(&shared, Ping(10));
        let mut state = shared.lock();
        assert!(ensure_running(&shared, &mut state));
        assert!(!ensure_running(&shared, &mut state));
        assert!(stop(&mut state));
        assert!(!stop(&mut state));
    }

    #[tokio::test]
    async fn finished_fetch_clears_in_flight_mark() {
        let (shared, calls) = shared(vec![Some(0)]);
        let cancel = CancellationToken::new();
        add(&shared, Ping(1));

        let TickOutcome::Dispatch(batch) = tick(&shared, 0, &cancel) else {
            panic!("expected dispatch");
        };
        for (request, fetcher) in batch {
            spawn_fetch(&shared, request, fetcher);
        }
        assert!(shared.lock().requests.is_in_flight(&Ping(1)));

        for _ in 0..50 {
            if !shared.lock().requests.is_in_flight(&Ping(1)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!shared.lock().requests.is_in_flight(&Ping(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
