//! Offline exporter: joins logged ranking events with the engagement that
//! followed them and writes one JSON object per candidate, ready for the
//! reranker trainer.

use std::{io::Write, path::PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use drift_service::DriftService;
use drift_storage::db::Db;

#[derive(Debug, Parser)]
#[command(version, rename_all = "kebab")]
struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	config: PathBuf,
	/// How many days of ranking events to export; defaults to the
	/// feed.export_window_days setting.
	#[arg(long)]
	days: Option<i64>,
	/// Output path for the JSONL dataset; stdout when omitted.
	#[arg(long, short = 'o', value_name = "FILE")]
	output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = Args::parse();
	let config = drift_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let window_days = args.days.unwrap_or(config.feed.export_window_days);
	let db = Db::connect(&config.storage.postgres).await?;
	db.ensure_schema().await?;
	let service = DriftService::new(config, db);

	let rows = service.export_training_rows(window_days).await?;
	let row_count = rows.len();

	let mut out: Box<dyn Write> = match &args.output {
		Some(path) => Box::new(std::fs::File::create(path)?),
		None => Box::new(std::io::stdout().lock()),
	};
	for row in rows {
		serde_json::to_writer(&mut out, &row)?;
		out.write_all(b"\n")?;
	}
	out.flush()?;

	tracing::info!(rows = row_count, window_days, "Training dataset exported.");
	Ok(())
}
