use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = qrecall_mcp::Args::parse();
	qrecall_mcp::run(args).await
}
