//! Pollr: lifecycle-aware periodic polling.
//!
//! Register a fetcher per request kind, submit requests carrying a polling
//! interval, and the scheduler calls each fetcher again once that interval
//! has elapsed since its last dispatch.
//!
//! # Architecture
//!
//! - **Clock**: reports whole time units elapsed between irregular ticks
//! - **Request registry**: active requests plus per-request wait counters
//! - **Handler registry**: fetcher lookup by [`RequestKind`](scheduler::RequestKind)
//! - **Runner**: the tokio tick loop that credits time and dispatches due requests
//! - **Lifecycle bridge**: stops polling while the host is inactive
//! - **Poller**: the façade callers hold

pub mod config;
pub mod error;
pub mod scheduler;

pub use config::PollerConfig;
pub use error::{PollError, Result};
pub use scheduler::{Fetcher, LifecycleSignal, Poller, Request, RequestKind};
