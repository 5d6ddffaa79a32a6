//! Command-line entry point: reads a prompt and prints clip suggestions.
//!
//! The prompt comes from the command-line arguments, or stdin when none are
//! given. Credentials are read from `CLIPGEN_CREDENTIALS_FILE`.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipgen_dispatch::{
    metrics, CancellationToken, CredentialRegistry, DispatchConfig, Dispatcher, GeminiClient,
    GeminiConfig, InMemoryLedger, JsonFileRegistry, JsonlLedger, UsageLedger,
};

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clipgen=info,clipgen_dispatch=info,warn"));

    // Logs go to stderr so stdout carries only the suggestions
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn read_prompt() -> Result<String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let prompt = if args.is_empty() {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("Failed to read prompt from stdin")?;
        buf
    } else {
        args.join(" ")
    };

    if prompt.trim().is_empty() {
        bail!("Empty prompt: pass it as arguments or on stdin");
    }
    Ok(prompt)
}

async fn build_dispatcher(config: DispatchConfig) -> Result<Dispatcher> {
    let credentials_path = std::env::var("CLIPGEN_CREDENTIALS_FILE")
        .context("CLIPGEN_CREDENTIALS_FILE must point to a credentials JSON file")?;
    let registry: Arc<dyn CredentialRegistry> = Arc::new(JsonFileRegistry::open(&credentials_path).await?);

    let ledger: Arc<dyn UsageLedger> = match std::env::var("CLIPGEN_USAGE_LEDGER") {
        Ok(path) if !path.trim().is_empty() => Arc::new(JsonlLedger::new(path)),
        _ => Arc::new(InMemoryLedger::new()),
    };

    let upstream = Arc::new(GeminiClient::new(GeminiConfig::from_env())?);

    Ok(Dispatcher::new(config, registry, upstream, ledger))
}

async fn run() -> Result<()> {
    let metrics_handle = if std::env::var("CLIPGEN_METRICS").map(|v| v == "1").unwrap_or(false) {
        Some(metrics::init_metrics()?)
    } else {
        None
    };

    let config = DispatchConfig::from_env();
    info!("Dispatch config: {:?}", config);

    let dispatcher = build_dispatcher(config).await?;
    let prompt = read_prompt().await?;
    let user_id = std::env::var("CLIPGEN_USER_ID").unwrap_or_else(|_| "local".to_string());

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                cancel.cancel();
            }
        })
    };

    let result = dispatcher.generate_with_cancel(&prompt, &user_id, &cancel).await;
    ctrl_c.abort();

    let clips = result?;
    println!("{}", serde_json::to_string_pretty(&clips)?);

    if let Some(handle) = metrics_handle {
        eprintln!("{}", handle.render());
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Failed to install rustls crypto provider");
        std::process::exit(1);
    }

    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting clipgen");

    if let Err(e) = run().await {
        error!("clipgen failed: {:#}", e);
        std::process::exit(1);
    }
}
