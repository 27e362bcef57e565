use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "vanish", about = "Vanish: burn-after-read secret drop", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Vanish HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, env = "VANISH_PORT", default_value = "8000")]
        port: u16,
        /// Host to bind
        #[arg(long, env = "VANISH_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Directory holding vanish.db (default: platform data dir)
        #[arg(long, env = "VANISH_DATA_DIR")]
        data_dir: Option<PathBuf>,
        /// Keep secrets in memory only; nothing is written to disk
        #[arg(long)]
        memory: bool,
        /// How often expired secrets are swept, e.g. 30s, 5m
        #[arg(long)]
        sweep_interval: Option<String>,
    },
    /// Delete all expired secrets on a running server immediately
    Prune {
        /// Vanish server URL
        #[arg(long, env = "VANISH_SERVER", default_value = "http://localhost:8000")]
        server: String,
        /// Admin bearer token
        #[arg(long, env = "VANISH_ADMIN_TOKEN")]
        token: Option<String>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("VANISH_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            data_dir,
            memory,
            sweep_interval,
        } => cmd_serve(host, port, data_dir, memory, sweep_interval.as_deref()).await,

        Commands::Prune { server, token } => {
            let token = token.context("--token / VANISH_ADMIN_TOKEN is required for prune")?;
            cmd_prune(&server, &token).await
        }
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(
    host: String,
    port: u16,
    data_dir: Option<PathBuf>,
    memory: bool,
    sweep_interval: Option<&str>,
) -> Result<()> {
    let mut cfg = vanish_server::ServerConfig {
        host,
        port,
        data_dir,
        in_memory: memory,
        admin_token: vanish_server::resolve_admin_token()?,
        ..Default::default()
    };
    if let Some(s) = sweep_interval {
        cfg.sweep_interval = parse_duration(s)?;
    }

    vanish_server::run(cfg).await
}

async fn cmd_prune(server: &str, token: &str) -> Result<()> {
    let client = Client::new();
    let resp = client
        .post(format!("{}/api/prune", server.trim_end_matches('/')))
        .bearer_auth(token)
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    if status.is_success() {
        let json: Value = resp.json().await.context("parse response")?;
        let n = json["pruned"].as_u64().unwrap_or(0);
        println!("pruned {n} expired secret(s)");
        Ok(())
    } else if status == reqwest::StatusCode::NOT_FOUND {
        anyhow::bail!("server has no admin token configured; prune is disabled")
    } else {
        let json: Value = resp.json().await.unwrap_or_default();
        anyhow::bail!(
            "server returned {status}: {}",
            json["error"].as_str().unwrap_or("")
        )
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Parse human duration strings like "30s", "5m", "1h".
fn parse_duration(s: &str) -> Result<std::time::Duration> {
    let d: humantime::Duration = s
        .parse()
        .with_context(|| format!("invalid duration: {s}"))?;
    Ok(d.into())
}
