//! Latency-adaptive reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                    PROXY                     │
//!   Client Request     │  ┌────────┐    ┌─────────┐    ┌───────────┐  │
//!   ───────────────────┼─▶│  http  │───▶│  cache  │───▶│ load      │  │
//!                      │  │ server │    │ lookup/ │    │ balancer  │  │
//!                      │  └────────┘    │ coalesce│    │ (WRR)     │  │
//!                      │       ▲        └─────────┘    └─────┬─────┘  │
//!                      │       │                             ▼        │
//!   Client Response    │  ┌────────┐                   ┌───────────┐  │
//!   ◀──────────────────┼──│response│◀──────────────────│ forwarder │◀─┼── Backend
//!                      │  └────────┘                   └─────┬─────┘  │
//!                      │                                     ▼        │
//!                      │  ┌────────────┐              ┌───────────┐   │
//!                      │  │  adjuster  │◀─ latency ───│  tracker  │   │
//!                      │  │ (weights)  │              │   (EMA)   │   │
//!                      │  └────────────┘              └───────────┘   │
//!                      └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use clap::Parser;

use latency_proxy::config::load_config;
use latency_proxy::lifecycle;
use latency_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "latency-proxy", version)]
#[command(about = "Latency-adaptive weighted round-robin reverse proxy with response caching")]
struct Args {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("latency-proxy: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "latency-proxy starting");

    match lifecycle::run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Proxy failed");
            ExitCode::FAILURE
        }
    }
}
