use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;

use clap::Parser;
use env_logger::Env;

use courseport::fetch::HttpFetcher;
use courseport::source::read_rows;
use courseport::store::ContentStore;
use courseport::store::memory::MemoryStore;
use courseport::store::postgres::PgStore;
use courseport::Importer;

#[derive(Parser, Debug)]
#[command(
    name = "courseport",
    about = "Import course content from a JSON Lines row file"
)]
struct Args {
    /// Path to the input file, one JSON object per row.
    #[arg(long)]
    input: PathBuf,

    /// PostgreSQL connection string; defaults to $DATABASE_URL.
    #[arg(long)]
    database_url: Option<String>,

    /// Run against a throwaway in-memory store instead of a database.
    #[arg(long)]
    dry_run: bool,

    /// Write the full JSON report to this path instead of stdout.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();

    let rows = read_rows(BufReader::new(File::open(&args.input)?))?;
    log::info!("loaded {} rows from {}", rows.len(), args.input.display());

    let fetcher = HttpFetcher::new()?;

    let memory_store;
    let pg_store;
    let store: &dyn ContentStore = if args.dry_run {
        log::info!("dry run: importing into an in-memory store");
        memory_store = MemoryStore::new();
        &memory_store
    } else {
        let database_url = match args.database_url {
            Some(url) => url,
            None => std::env::var("DATABASE_URL")
                .map_err(|_| "pass --database-url, set DATABASE_URL, or use --dry-run")?,
        };
        pg_store = PgStore::connect(&database_url).await?;
        &pg_store
    };

    let importer = Importer::new(store, &fetcher);
    let report = importer.import(rows).await;

    let json = serde_json::to_string_pretty(&report)?;
    match &args.report {
        Some(path) => {
            File::create(path)?.write_all(json.as_bytes())?;
            log::info!("report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    log::info!(
        "{} rows: {} imported ({} created, {} updated), {} with issues",
        report.stats.rows,
        report.stats.imported,
        report.stats.created,
        report.stats.updated,
        report.stats.failed
    );

    if report.stats.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
