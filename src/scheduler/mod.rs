//! Lifecycle-aware periodic polling scheduler.
//!
//! Callers register a [`Fetcher`] per [`RequestKind`], then submit requests.
//! A background tokio task ticks once per tick period, credits elapsed time to
//! every active request, and dispatches each request whose accumulated wait
//! has reached its interval. The loop stops itself when no requests remain,
//! and follows the host's active/inactive lifecycle.

pub mod clock;
pub mod handlers;
pub mod lifecycle;
pub mod poller;
pub mod registry;
pub(crate) mod runner;
pub mod request;

pub use clock::{Clock, Stopwatch};
pub use handlers::HandlerRegistry;
pub use lifecycle::{LifecycleSignal, lifecycle_channel};
pub use poller::Poller;
pub use registry::RequestRegistry;
pub use request::{Fetcher, Request, RequestKind};
