use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use nhatro_core::RawPost;
use nhatro_extract::{Gazetteer, RecordAssembler};
use nhatro_sync::{FileStatus, ImportStatus, SyncConfig};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "nhatro-cli")]
#[command(about = "Rental listing harvester")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Harvest enabled sources into the flat file, and the database when enabled.
    Harvest,
    /// Re-import the current flat file into the database.
    Import,
    /// Assemble a single post and print the record as JSON.
    Parse {
        text: String,
        #[arg(long)]
        price: Option<String>,
        #[arg(long)]
        area: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        contact: Option<String>,
        #[arg(long)]
        posted_at: Option<String>,
    },
    /// Create the listing table if it does not exist.
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Harvest);
    debug!(?command, "dispatching");

    match command {
        Commands::Harvest => {
            let summary = nhatro_sync::run_harvest_from_env().await?;
            println!(
                "harvest complete: run_id={} seen={} accepted={} duplicates={} without_id={} total={} priced={}",
                summary.run_id,
                summary.posts_seen,
                summary.outcome.accepted,
                summary.outcome.duplicates,
                summary.outcome.without_identity,
                summary.total_records,
                summary.priced_posts
            );
            for source in &summary.sources {
                match &source.error {
                    Some(error) => println!("  source {}: skipped ({error})", source.source_id),
                    None => println!(
                        "  source {}: pages={} accepted={} stopped_early={}",
                        source.source_id,
                        source.pages_read,
                        source.outcome.accepted,
                        source.stopped_early
                    ),
                }
            }
            for (district, count) in &summary.district_distribution {
                println!("  district {district}: {count}");
            }
            match &summary.flat_file {
                FileStatus::Written { path, rows } => println!("  flat file: {rows} rows -> {path}"),
                FileStatus::Failed { error } => println!("  flat file: FAILED ({error})"),
            }
            match &summary.import {
                ImportStatus::Disabled => println!("  database import: disabled"),
                ImportStatus::Completed { report } => println!(
                    "  database import: inserted={} updated={} retried={} batches={}",
                    report.inserted, report.updated, report.retried_attempts, report.batches_committed
                ),
                ImportStatus::Failed { error, committed } => {
                    bail!("database import failed after {committed} committed rows: {error}")
                }
            }
        }
        Commands::Import => {
            let config = SyncConfig::from_env();
            let report = nhatro_sync::import_flat_file(&config).await?;
            println!(
                "import complete: processed={} inserted={} updated={} retried={} batches={}",
                report.processed,
                report.inserted,
                report.updated,
                report.retried_attempts,
                report.batches_committed
            );
        }
        Commands::Parse {
            text,
            price,
            area,
            address,
            contact,
            posted_at,
        } => {
            let config = SyncConfig::from_env();
            let gazetteer = Gazetteer::load_or_empty(config.gazetteer_path());
            let post = RawPost {
                content: text,
                raw_price_text: price.unwrap_or_default(),
                raw_area_text: area.unwrap_or_default(),
                raw_address_text: address.unwrap_or_default(),
                raw_contact_text: contact.unwrap_or_default(),
                raw_posted_at: posted_at,
            };
            let record = RecordAssembler::new(&gazetteer).assemble(&post, Utc::now());
            let json = serde_json::to_string_pretty(&record).context("serializing record")?;
            println!("{json}");
        }
        Commands::InitDb => {
            let config = SyncConfig::from_env();
            nhatro_sync::init_database(&config).await?;
            println!("listing table ready");
        }
    }

    Ok(())
}
