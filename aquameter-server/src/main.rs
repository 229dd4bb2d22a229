//! aquameter-server — sensor ingestion and query API with background
//! downsampling.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use aquameter::config::{
    DEFAULT_BUCKET, DEFAULT_ORG, DEFAULT_RAW_SERIES, DEFAULT_STORE_URL, DEFAULT_TOKEN,
};
use aquameter::{Store, StoreConfig};
use aquameter_server::scheduler::TICK;
use aquameter_server::{AppState, Scheduler, create_router};
use clap::Parser;
use tokio::signal;

/// aquameter-server — Water-quality measurement API.
#[derive(Parser)]
#[command(name = "aquameter-server", version, about)]
struct Args {
    /// Address to bind to.
    #[arg(long, env = "AQUAMETER_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "AQUAMETER_PORT", default_value = "8081")]
    port: u16,

    /// Store location: memory:// or file://<path>.
    #[arg(long, env = "AQUAMETER_STORE_URL", default_value = DEFAULT_STORE_URL)]
    store_url: String,

    /// Store access token.
    #[arg(long, env = "AQUAMETER_STORE_TOKEN", default_value = DEFAULT_TOKEN, hide_env_values = true)]
    store_token: String,

    /// Store organization.
    #[arg(long, env = "AQUAMETER_STORE_ORG", default_value = DEFAULT_ORG)]
    store_org: String,

    /// Store bucket.
    #[arg(long, env = "AQUAMETER_STORE_BUCKET", default_value = DEFAULT_BUCKET)]
    store_bucket: String,

    /// Name of the raw measurement series.
    #[arg(long, env = "AQUAMETER_RAW_SERIES", default_value = DEFAULT_RAW_SERIES)]
    raw_series: String,

    /// Timeout for a single store call, in seconds.
    #[arg(long, env = "AQUAMETER_STORE_TIMEOUT_SECS", default_value = "5")]
    store_timeout_secs: u64,

    /// Skip provisioning the aggregation tasks at startup.
    #[arg(long)]
    no_setup_tasks: bool,
}

impl Args {
    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            url: self.store_url.clone(),
            token: self.store_token.clone(),
            org: self.store_org.clone(),
            bucket: self.store_bucket.clone(),
            raw_series: self.raw_series.clone(),
            store_timeout: Duration::from_secs(self.store_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::error!("server failed: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.store_config();
    tracing::info!(?config, "opening store");
    let store = Arc::new(Store::open(&config)?);

    let state = AppState::new(Arc::clone(&store), config.store_timeout);

    if args.no_setup_tasks {
        tracing::info!("skipping aggregation task setup");
    } else {
        let tasks = Arc::clone(&state.tasks);
        let report = tokio::task::spawn_blocking(move || tasks.setup_all()).await?;
        if report.is_success() {
            tracing::info!(
                created = report.created.len(),
                existing = report.existing.len(),
                "aggregation tasks ready"
            );
        } else {
            for (name, e) in &report.failed {
                tracing::warn!(task = %name, "aggregation task not provisioned: {e}");
            }
        }
    }

    let scheduler = tokio::spawn(Scheduler::new(store, Arc::clone(&state.tasks)).run(TICK));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{addr}");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.abort();
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
