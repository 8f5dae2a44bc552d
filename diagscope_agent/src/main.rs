//! diagscope_agent: load diagnostic captures once, then serve their series
//! to a simple-JSON charting datasource.

mod config;
mod http;
mod state;

use std::env;
use std::net::SocketAddr;

use anyhow::{anyhow, Context};
use diagscope::SeriesStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{AgentConfig, ArgsError};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = match AgentConfig::parse(env::args(), |k| env::var(k).ok()) {
        Ok(c) => c,
        Err(ArgsError::Help(usage)) => {
            eprintln!("{usage}");
            return Ok(());
        }
        Err(ArgsError::Invalid(msg)) => return Err(anyhow!(msg)),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = SeriesStore::new(cfg.engine());
    let summary = store
        .rebuild(&cfg.paths)
        .await
        .context("loading diagnostic data")?;
    if let Some(endpoint) = &summary.endpoint {
        info!("dashboard: {endpoint}");
    }

    let app = http::router(AppState::new(store, cfg.paths.clone()));
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("diagscope agent listening on http://{addr}/grafana");
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}
