use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use app::{App, Discovery};
use clap::{Args, Parser, Subcommand};
use config::Config;
use destination::{ConsoleDestination, Destination, WebhookDestination};
use dispatch::{shutdown_channel, DeliveryOrder, Dispatcher};
use models::SetCode;
use mtg::ScryfallCatalog;
use store::FileStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod destination;
mod dispatch;
mod error;
mod models;
mod mtg;
mod render;
mod store;
#[cfg(test)]
mod testing;

#[derive(Parser, Debug)]
#[command(name = "mtg-spoiler-bot", version, about = "Announces newly spoiled Magic cards")]
struct Cli {
    #[arg(long, global = true, help = "Config file (YAML)")]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        default_value = "info",
        help = "Log level when RUST_LOG is not set"
    )]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look for cards of a set not posted yet and post them
    Discover(DiscoverArgs),
}

#[derive(Args, Debug)]
struct DiscoverArgs {
    /// Set code, e.g. `neo`
    set: String,
    #[arg(short, long, help = "Also post progress and \"nothing new\" notices")]
    verbose: bool,
    #[arg(long, help = "Chat webhook URL; posts to stdout when omitted")]
    webhook: Option<String>,
    #[arg(long, requires = "webhook", help = "Id the webhook's seen cards are kept under")]
    destination_id: Option<String>,
    #[arg(long, help = "Delay between two cards")]
    interval_ms: Option<u64>,
    #[arg(long, value_enum)]
    order: Option<DeliveryOrder>,
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long, value_name = "SECS", help = "Repeat discovery on this period until Ctrl-C")]
    every: Option<u64>,
}

fn initialize_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mtg_spoiler_bot={log_level}")));

    // stdout belongs to the console destination
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(&cli.log_level);

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Discover(args) => discover_command(config, args).await,
    }
}

async fn discover_command(mut config: Config, args: DiscoverArgs) -> Result<()> {
    if let Some(interval_ms) = args.interval_ms {
        config.dispatch.interval_ms = interval_ms;
    }
    if let Some(order) = args.order {
        config.dispatch.order = order;
    }
    if let Some(dir) = args.data_dir {
        config.store.data_dir = Some(dir);
    }

    let store = Arc::new(FileStore::new(config.data_dir()?));
    let catalog = Arc::new(
        ScryfallCatalog::new(&config.catalog).context("Failed to create catalog client")?,
    );
    let destination: Arc<dyn Destination> = match args.webhook {
        Some(url) => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.catalog.timeout_seconds))
                .build()
                .context("Failed to create webhook client")?;
            let id = args.destination_id.unwrap_or_else(|| "webhook".to_owned());
            Arc::new(WebhookDestination::new(id, url, client))
        }
        None => Arc::new(ConsoleDestination),
    };

    let (trigger, mut shutdown) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            trigger.trigger();
        }
    });

    let dispatcher = Dispatcher::new(
        Duration::from_millis(config.dispatch.interval_ms),
        config.dispatch.order,
    );
    let app = App::new(store, catalog, dispatcher, shutdown.clone());
    let set = SetCode::new(&args.set);

    loop {
        let outcome = app.discover(&set, destination.clone(), args.verbose).await;
        if let Discovery::Announcing { count, .. } = &outcome {
            info!(set = %set, count, "announcing new cards");
        }
        if let Some(report) = outcome.finished().await {
            info!(
                delivered = report.delivered,
                failed = report.failed,
                cancelled = report.cancelled,
                "batch finished"
            );
        }

        let Some(every) = args.every else {
            break;
        };
        if shutdown.is_triggered() {
            break;
        }
        tokio::select! {
            _ = shutdown.triggered() => break,
            _ = tokio::time::sleep(Duration::from_secs(every)) => {}
        }
    }

    Ok(())
}
