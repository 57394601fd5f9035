use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use latency_proxy::admin::handlers::BackendStatus;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the latency-adaptive proxy", long_about = None)]
struct Cli {
    /// Admin API base URL.
    #[arg(short, long, default_value = "http://127.0.0.1:9091")]
    url: String,

    /// Admin API bearer token.
    #[arg(short, long)]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy status
    Status,
    /// Show backend weights and latency
    Backends {
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show response cache counters
    Cache,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/admin/status", base)).send().await?;
            print_json(res).await?;
        }
        Commands::Backends { json: true } => {
            let res = client.get(format!("{}/admin/backends", base)).send().await?;
            print_json(res).await?;
        }
        Commands::Backends { json: false } => {
            let res = client.get(format!("{}/admin/backends", base)).send().await?;
            if let Some(res) = check(res).await {
                let backends: Vec<BackendStatus> = res.json().await?;
                print_backends(&backends);
            }
        }
        Commands::Cache => {
            let res = client.get(format!("{}/admin/cache", base)).send().await?;
            print_json(res).await?;
        }
    }

    Ok(())
}

async fn check(res: reqwest::Response) -> Option<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Some(res);
    }
    eprintln!("Error: Admin API returned status {}", status);
    if let Ok(text) = res.text().await {
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
    }
    None
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(res) = check(res).await {
        let json: Value = res.json().await?;
        println!("{}", serde_json::to_string_pretty(&json)?);
    }
    Ok(())
}

fn print_backends(backends: &[BackendStatus]) {
    println!(
        "{:<4} {:<30} {:>7} {:>12} {:>10} {:>10} {:>10}",
        "#", "ENDPOINT", "WEIGHT", "AVG_MS", "REQUESTS", "RESPONSES", "DEGRADED"
    );
    for b in backends {
        let degraded = b
            .degraded_secs_ago
            .map(|s| format!("{}s ago", s))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<4} {:<30} {:>7} {:>12} {:>10} {:>10} {:>10}",
            b.index, b.endpoint, b.weight, b.avg_latency_ms, b.request_count, b.total_responses, degraded
        );
    }
}
