use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use platform_feed::config::AppConfig;
use platform_feed::global::GlobalState;
use platform_feed::signal::SignalHandler;
use platform_feed::{logging, migration};
use tokio::signal::unix::SignalKind;
use tokio::{select, time};
use utils::context::Context;

#[derive(Debug, Parser)]
#[command(name = "platform-feed", version, about = "Feed fan-out and notification engine")]
struct Args {
	/// Path to a YAML config file
	#[arg(long, short)]
	config: Option<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<AppConfig> {
	match &args.config {
		Some(path) => AppConfig::from_file(path),
		None => Ok(AppConfig::default()),
	}
}

async fn run() -> anyhow::Result<()> {
	let args = Args::parse();

	let config = load_config(&args)
		.map_err(|err| {
			logging::init("trace", Default::default()).ok();
			err
		})
		.context("failed to parse config")?;

	logging::init(&config.logging.level, config.logging.mode).context("failed to init logging")?;

	tracing::info!(name = %config.name, "starting up");

	let (ctx, handler) = Context::new();

	let global = Arc::new(GlobalState::new(ctx, config).await.context("failed to create global state")?);

	migration::run_migrations(&global).await.context("failed to run migrations")?;

	let mut signal_handler = SignalHandler::new()
		.with_signal(SignalKind::interrupt())
		.and_then(|signals| signals.with_signal(SignalKind::terminate()))
		.context("failed to install signal handlers")?;

	tracing::info!("ready");

	signal_handler.recv().await;
	tracing::info!("shutting down");

	drop(global);

	tracing::info!("waiting for tasks to finish");

	select! {
		_ = time::sleep(Duration::from_secs(60)) => tracing::warn!("force shutting down"),
		_ = signal_handler.recv() => tracing::warn!("force shutting down"),
		_ = handler.shutdown() => tracing::info!("shut down"),
	}

	Ok(())
}

#[tokio::main]
async fn main() {
	if let Err(err) = run().await {
		tracing::error!("{:#}", err);
		std::process::exit(1);
	}
}
