use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{debug, error, info};
use tokio::sync::mpsc;
use vanopticon_mimir::observability::{AggregatorMetrics, init_logging};
use vanopticon_mimir::{Aggregator, Settings, SnapshotMarshaler, SourceSet, config, store};

#[derive(Parser)]
#[command(
	name = "mimir",
	about = "Mimir - merges configuration fragments from an object store"
)]
struct Cli {
	/// Extra settings file, layered over the system and user config files
	#[arg(short, long, env = "MMR_CONFIG", global = true)]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
	/// Poll the configured objects and print each merged snapshot as one JSON
	/// line until interrupted (default)
	Run,
	/// Run a single pass and print the merged configuration
	Once,
	/// Validate the configuration and print the resolved sources
	Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	let settings = config::load(cli.config.as_deref()).context("failed to load settings")?;
	init_logging(settings.log_level)?;

	match cli.command.unwrap_or(Commands::Run) {
		Commands::Run => run(settings).await,
		Commands::Once => once(settings).await,
		Commands::Validate => validate(&settings),
	}
}

fn validate(settings: &Settings) -> anyhow::Result<()> {
	let validated = settings.provider.validate()?;
	println!(
		"poll interval: {}",
		humantime::format_duration(validated.poll_interval)
	);
	for (i, source) in validated.sources.iter().enumerate() {
		println!("object[{}]: {}", i, source);
	}
	Ok(())
}

async fn once(settings: Settings) -> anyhow::Result<()> {
	let validated = settings.provider.validate()?;
	let store = store::from_settings(&settings.store)?;
	let mut sources = SourceSet::from_config(&validated, store)?;

	let merged = sources
		.poll_once()
		.await?
		.context("no sources were fetched")?;
	println!("{}", serde_json::to_string_pretty(&merged)?);
	Ok(())
}

async fn run(settings: Settings) -> anyhow::Result<()> {
	let validated = settings.provider.validate()?;
	let store = store::from_settings(&settings.store)?;
	let metrics = Arc::new(AggregatorMetrics::new()?);

	let mut aggregator = Aggregator::new("mimir", validated, store)?.with_metrics(metrics.clone());
	let (tx, mut rx) = mpsc::channel(settings.channel_capacity.max(1));
	aggregator.start(tx)?;

	let shutdown = tokio::signal::ctrl_c();
	tokio::pin!(shutdown);

	loop {
		tokio::select! {
			res = &mut shutdown => {
				if let Err(e) = res {
					error!("failed to listen for shutdown signal: {}", e);
				}
				info!("shutdown requested");
				break;
			}
			snapshot = rx.recv() => {
				let Some(snapshot) = snapshot else {
					break;
				};
				match snapshot.marshal() {
					Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
					Err(e) => error!("{}", e),
				}
			}
		}
	}

	if aggregator.is_running() {
		aggregator.stop()?;
	}
	aggregator.join().await;
	debug!("final metrics:\n{}", metrics.encode());
	Ok(())
}
