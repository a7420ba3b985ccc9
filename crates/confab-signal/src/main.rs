//! Confab signaling server binary

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use confab_crypto::MessageCipher;
use confab_signal::auth::AuthClient;
use confab_signal::http::signal_router;
use confab_signal::registry::Registry;
use confab_signal::router::Router;
use confab_signal::SignalState;
use confab_store::{MessageStore, SignalConfig};

#[derive(Parser)]
#[command(name = "confab-signal")]
#[command(about = "Confab signaling server", long_about = None)]
struct Cli {
    /// Bind address override (otherwise CONFAB_SIGNAL_ADDR or the default)
    #[arg(short, long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = SignalConfig::from_env().context("loading configuration")?;
    let addr = cli.addr.unwrap_or_else(|| config.bind_addr.clone());

    let cipher = Arc::new(
        MessageCipher::from_base64(&config.encryption_key)
            .context("loading CONFAB_ENCRYPTION_KEY")?,
    );
    let store = Arc::new(MessageStore::open(&config.data_dir).context("opening message store")?);
    let registry = Arc::new(Registry::new());
    let router = Arc::new(Router::new(Arc::clone(&registry), store, cipher));
    let auth = AuthClient::new(config.auth_endpoint(), config.auth_timeout);

    let state = Arc::new(SignalState {
        registry,
        router,
        auth,
    });

    let app = signal_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, "signaling server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
