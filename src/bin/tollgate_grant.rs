//! Tollgate grant service -- internal token issuance.
//!
//! Serves `POST /grant` for the trusted application backend.  Deployed
//! on an internal network only; it shares the config file (and thus the
//! signing secret, issuer, audience, and expiry bounds) with the public
//! delivery worker so the two sides of the protocol stay in lockstep.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use tollgate::policy::PrefixOwnershipPolicy;

/// Command-line arguments for the Tollgate grant service.
#[derive(Parser, Debug)]
#[command(
    name = "tollgate-grant",
    version,
    about = "Access-token issuance service for Tollgate"
)]
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
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.grant_port));

    tollgate::metrics::init_metrics();
    tollgate::metrics::describe_metrics();
    info!("Prometheus metrics initialized");

    // The issuer cannot be constructed without an access policy;
    // key-prefix ownership is the deployment's authorization rule.
    let issuer =
        tollgate::token::TokenIssuer::new(&config.auth, Arc::new(PrefixOwnershipPolicy))
            .map_err(|e| anyhow::anyhow!("token issuer init failed: {e}"))?;
    let verifier = tollgate::token::TokenVerifier::new(&config.auth)
        .map_err(|e| anyhow::anyhow!("token verifier init failed: {e}"))?;

    // The grant service never touches storage; an empty bucket map
    // keeps the shared AppState shape.
    let state = Arc::new(tollgate::AppState {
        config: config.clone(),
        buckets: tollgate::buckets::BucketMap::default(),
        verifier,
        issuer: Some(issuer),
    });

    let app = tollgate::server::grant_app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Tollgate grant service listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Tollgate grant service shut down");

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
