//! Tollgate -- public token-gated delivery worker.
//!
//! Serves `GET /?token=...`: verifies the signed token, resolves the
//! logical bucket, and streams the object back.  Stateless by design:
//! the only configuration is the shared signing secret and the bucket
//! bindings, both loaded at startup.  SIGTERM/SIGINT handlers stop
//! accepting connections and wait for in-flight streams to drain.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

/// Command-line arguments for the Tollgate delivery worker.
#[derive(Parser, Debug)]
#[command(name = "tollgate", version, about = "Token-gated object delivery worker")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "tollgate.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = tollgate::config::load_config(&cli.config)?;
    init_tracing(&config.logging);
    info!("Loaded configuration from {}", cli.config);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    // Initialize Prometheus metrics recorder and register metric descriptions.
    tollgate::metrics::init_metrics();
    tollgate::metrics::describe_metrics();
    info!("Prometheus metrics initialized");

    // The verifier fails fast on a missing or malformed secret; a
    // delivery worker that cannot verify must not come up.
    let verifier = tollgate::token::TokenVerifier::new(&config.auth)
        .map_err(|e| anyhow::anyhow!("token verifier init failed: {e}"))?;

    // Build the bucket dispatch table from config.
    let buckets = tollgate::buckets::BucketMap::from_config(&config).await?;
    if buckets.is_empty() {
        anyhow::bail!("no buckets configured; every delivery would fail");
    }
    info!("{} bucket binding(s) configured", buckets.len());

    let state = Arc::new(tollgate::AppState {
        config: config.clone(),
        buckets,
        verifier,
        // The public worker never mints tokens.
        issuer: None,
    });

    let app = tollgate::server::delivery_app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Tollgate delivery worker listening on {}", bind_addr);

    // Graceful shutdown: on SIGTERM/SIGINT, stop accepting new
    // connections and let in-flight streams finish.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Tollgate delivery worker shut down");

    Ok(())
}

/// Initialize the tracing subscriber per the logging config.  The
/// `RUST_LOG` env var still wins when set.
fn init_tracing(logging: &tollgate::config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(logging.level.clone()));

    if logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
