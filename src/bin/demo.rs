//! Demo host for the poller.
//!
//! Registers a fetcher, submits a request, then walks the poller through a
//! background/foreground cycle and a cancel so the log shows every loop
//! transition. Pass a TOML config path as the first argument to override
//! the default timing.

use async_trait::async_trait;
use pollr::scheduler::lifecycle_channel;
use pollr::{Fetcher, LifecycleSignal, Poller, PollerConfig, Request, RequestKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QuoteRequest {
    symbol: String,
}

impl Request for QuoteRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::new("quote")
    }

    fn interval(&self) -> u64 {
        5
    }
}

struct QuoteFetcher;

#[async_trait]
impl Fetcher<QuoteRequest> for QuoteFetcher {
    async fn fetch(&self, request: QuoteRequest) -> anyhow::Result<()> {
        info!(symbol = %request.symbol, "fetching");
        tokio::time::sleep(Duration::from_millis(2)).await;
        info!(symbol = %request.symbol, "storing");
        tokio::time::sleep(Duration::from_millis(2)).await;
        info!(symbol = %request.symbol, "finished");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pollr=info,pollr_demo=info")),
        )
        .init();

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => PollerConfig::from_file(&path)?,
        None => PollerConfig::default(),
    };
    let tick = config.tick_interval();

    let poller: Poller<QuoteRequest> = Poller::new(config, tokio::runtime::Handle::current())?;
    poller.register(RequestKind::new("quote"), Arc::new(QuoteFetcher));

    let (lifecycle_tx, lifecycle_rx) = lifecycle_channel();
    poller.attach_lifecycle(lifecycle_rx);

    let request = QuoteRequest {
        symbol: "ACME".to_owned(),
    };
    poller.request(std::slice::from_ref(&request))?;
    tokio::time::sleep(tick * 12).await;

    lifecycle_tx.send(LifecycleSignal::Inactive)?;
    tokio::time::sleep(tick * 3).await;
    lifecycle_tx.send(LifecycleSignal::Active)?;
    tokio::time::sleep(tick * 6).await;

    poller.cancel(std::slice::from_ref(&request));
    tokio::time::sleep(tick * 2).await;
    info!(running = poller.is_running(), "demo finished");

    poller.shutdown();
    Ok(())
}
