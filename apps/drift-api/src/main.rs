use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = drift_api::Args::parse();
	drift_api::run(args).await
}
