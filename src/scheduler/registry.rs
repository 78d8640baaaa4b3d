//! Active request set and per-request wait counters.
//!
//! A request is active from the moment it is accepted until it is cancelled.
//! Its wait counter is the number of time units credited since its last
//! dispatch. A request the loop has never seen has no counter; the first
//! credit seeds it to `u64::MAX`, so new requests dispatch on their first
//! tick whatever their interval.

use crate::scheduler::handlers::HandlerRegistry;
use crate::scheduler::request::Request;
use std::collections::{HashMap, HashSet};

#[derive(Debug)]
pub struct RequestRegistry<R: Request> {
    active: HashSet<R>,
    waits: HashMap<R, u64>,
    /// Requests whose fetch has been dispatched and not yet completed.
    /// Survives `remove` so a re-added request cannot overlap its own fetch.
    in_flight: HashSet<R>,
}

impl<R: Request> Default for RequestRegistry<R> {
    fn default() -> Self {
        Self {
            active: HashSet::new(),
            waits: HashMap::new(),
            in_flight: HashSet::new(),
        }
    }
}

impl<R: Request> RequestRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a batch of requests.
    ///
    /// All-or-nothing: if any request's kind has no fetcher the batch is
    /// rejected before anything is inserted. Re-adding an active request is a
    /// no-op and keeps its wait counter. Returns the requests that were not
    /// already active, in batch order.
    pub fn add(&mut self, handlers: &HandlerRegistry<R>, requests: &[R]) -> crate::Result<Vec<R>> {
        handlers.ensure_registered(requests)?;
        let added = requests
            .iter()
            .filter(|request| self.active.insert((*request).clone()))
            .cloned()
            .collect();
        Ok(added)
    }

    /// Drop requests and their wait counters. Absent requests are ignored.
    /// Returns the number of requests that were active.
    pub fn remove(&mut self, requests: &[R]) -> usize {
        let mut removed = 0;
        for request in requests {
            if self.active.remove(request) {
                removed += 1;
            }
            self.waits.remove(request);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn contains(&self, request: &R) -> bool {
        self.active.contains(request)
    }

    /// Current wait counter, `None` until the first tick credits it.
    pub fn wait_of(&self, request: &R) -> Option<u64> {
        self.waits.get(request).copied()
    }

    pub fn is_in_flight(&self, request: &R) -> bool {
        self.in_flight.contains(request)
    }

    /// Credit `elapsed` units to every active request.
    pub fn accumulate(&mut self, elapsed: u64) {
        for request in &self.active {
            self.waits
                .entry(request.clone())
                .and_modify(|wait| *wait = wait.saturating_add(elapsed))
                .or_insert(u64::MAX);
        }
    }

    /// Snapshot of active requests whose counter has reached their interval.
    pub fn due(&self) -> Vec<R> {
        self.active
            .iter()
            .filter(|request| self.waits.get(*request).copied().unwrap_or(0) >= request.interval())
            .cloned()
            .collect()
    }

    /// Claim a due request for dispatch: resets its counter and marks it in
    /// flight. Returns `false` when the request was cancelled since the
    /// snapshot, is no longer due, or still has a fetch outstanding (its
    /// counter is left alone so it fires once that fetch completes).
    pub fn begin_dispatch(&mut self, request: &R) -> bool {
        if !self.active.contains(request) || self.in_flight.contains(request) {
            return false;
        }
        match self.waits.get_mut(request) {
            Some(wait) if *wait >= request.interval() => {
                *wait = 0;
                self.in_flight.insert(request.clone());
                true
            }
            _ => false,
        }
    }

    /// Clear the in-flight mark once a fetch has finished.
    pub fn finish_dispatch(&mut self, request: &R) {
        self.in_flight.remove(request);
    }
}
