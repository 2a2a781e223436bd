pub mod server;

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use qrecall_config::{Config, Transport};
use qrecall_service::RecallService;
use qrecall_storage::qdrant::QdrantStore;

#[derive(Debug, Parser)]
#[command(
	version = qrecall_cli::VERSION,
	rename_all = "kebab",
	styles = qrecall_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = qrecall_config::load(&args.config)?;
	init_tracing(&config);
	let store = QdrantStore::new(&config.storage.qdrant)?;
	let transport = config.service.transport;
	let service = Arc::new(RecallService::new(config, Arc::new(store)));

	match transport {
		Transport::StreamableHttp => server::serve_http(service).await,
		Transport::Stdio => server::serve_stdio(service).await,
	}
}

fn init_tracing(config: &Config) {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	// stdout carries the protocol on the stdio transport.
	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
