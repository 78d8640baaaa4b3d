//! Request and fetcher contracts.
//!
//! A [`Request`] is a value-equal unit of polling work. Two requests with the
//! same kind and the same field contents are the same entry in the active set.
//! Each request kind is served by exactly one [`Fetcher`].

use async_trait::async_trait;
use std::fmt;
use std::hash::Hash;

/// Explicit tag naming a request type. Fetchers are registered per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKind(&'static str);

impl RequestKind {
    /// Create a kind tag.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Tag name.
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A pollable request.
///
/// Usually implemented on one enum with a variant per request type:
///
/// ```rust
/// use pollr::scheduler::{Request, RequestKind};
///
/// #[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// enum AppRequest {
///     Weather { city: String },
///     Inbox,
/// }
///
/// impl Request for AppRequest {
///     fn kind(&self) -> RequestKind {
///         match self {
///             Self::Weather { .. } => RequestKind::new("weather"),
///             Self::Inbox => RequestKind::new("inbox"),
///         }
///     }
///
///     fn interval(&self) -> u64 {
///         match self {
///             Self::Weather { .. } => 600,
///             Self::Inbox => 30,
///         }
///     }
/// }
/// ```
pub trait Request: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Kind used to look up the fetcher.
    fn kind(&self) -> RequestKind;

    /// Number of time units that must accumulate before the request is
    /// dispatched again. Zero means the request is due on every tick.
    fn interval(&self) -> u64;
}

/// Performs the fetch-and-store side effect for one request kind.
///
/// Errors are the fetcher's own concern: the scheduler logs them and keeps
/// polling. Nothing is retried early because of a failure.
#[async_trait]
pub trait Fetcher<R: Request>: Send + Sync {
    async fn fetch(&self, request: R) -> anyhow::Result<()>;
}
