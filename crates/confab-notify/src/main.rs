//! Confab reminder worker binary

#![forbid(unsafe_code)]

mod mail;
mod scheduler;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use confab_store::{NotifyConfig, ReminderStore};

use mail::{MailSink, Mailer};
use scheduler::Scheduler;

#[derive(Parser)]
#[command(name = "confab-notify")]
#[command(about = "Confab reminder worker", long_about = None)]
struct Cli {
    /// Run a single scan-and-send pass, then exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = NotifyConfig::from_env().context("loading configuration")?;

    let store = Arc::new(
        ReminderStore::connect(&config.database_url)
            .await
            .context("connecting to the reminder store")?,
    );
    let mailer: Arc<dyn Mailer> = Arc::new(MailSink::new(config.smtp.clone()));
    let scheduler = Scheduler::new(store, mailer, config.tick, config.lookahead);

    if cli.once {
        scheduler.run_tick().await;
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await;
    Ok(())
}
