//! Fetcher registry keyed by [`RequestKind`].

use crate::scheduler::request::{Fetcher, Request, RequestKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps each request kind to its fetcher. Bindings are never removed.
pub struct HandlerRegistry<R: Request> {
    fetchers: HashMap<RequestKind, Arc<dyn Fetcher<R>>>,
}

impl<R: Request> Default for HandlerRegistry<R> {
    fn default() -> Self {
        Self {
            fetchers: HashMap::new(),
        }
    }
}

impl<R: Request> std::fmt::Debug for HandlerRegistry<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&RequestKind> = self.fetchers.keys().collect();
        kinds.sort();
        f.debug_struct("HandlerRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

impl<R: Request> HandlerRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `fetcher` to `kind`. A later binding for the same kind replaces
    /// the earlier one. Returns `true` when a binding was replaced.
    pub fn register(&mut self, kind: RequestKind, fetcher: Arc<dyn Fetcher<R>>) -> bool {
        self.fetchers.insert(kind, fetcher).is_some()
    }

    /// Fetcher bound to `kind`, if any.
    pub fn lookup(&self, kind: RequestKind) -> Option<Arc<dyn Fetcher<R>>> {
        self.fetchers.get(&kind).cloned()
    }

    pub fn contains(&self, kind: RequestKind) -> bool {
        self.fetchers.contains_key(&kind)
    }

    /// Fail with [`PollError::UnregisteredHandler`](crate::PollError::UnregisteredHandler)
    /// naming the first request whose kind has no fetcher.
    pub fn ensure_registered<'a>(
        &self,
        requests: impl IntoIterator<Item = &'a R>,
    ) -> crate::Result<()> {
        for request in requests {
            let kind = request.kind();
            if !self.contains(kind) {
                return Err(crate::PollError::UnregisteredHandler { kind });
            }
        }
        Ok(())
    }
}
