#![forbid(unsafe_code)]

//! Flags Ramadan series and filmed plays in the stored catalog.

use std::path::PathBuf;

use anyhow::Result;
use cinma_tools::config::{DEFAULT_ENV_PATH, Settings};
use cinma_tools::logging;
use cinma_tools::store::{DEFAULT_PAGE_SIZE, RowStore, SqliteStore};
use cinma_tools::supabase::SupabaseClient;
use cinma_tools::tagger::{ContentTagger, TagReport};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Tag Ramadan series and plays.")]
struct Cli {
    #[arg(long = "env-file", value_name = "PATH", default_value = DEFAULT_ENV_PATH)]
    env_file: PathBuf,
    #[arg(long = "page-size", value_name = "N", default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,
    #[arg(long = "local-db", value_name = "PATH", help = "Tag a local SQLite mirror")]
    local_db: Option<PathBuf>,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let report = match &cli.local_db {
        Some(path) => run(&SqliteStore::open(path)?, cli.page_size),
        None => {
            let settings = Settings::load(&cli.env_file)?;
            let client = SupabaseClient::new(&settings.require_supabase()?);
            run(&client, cli.page_size)
        }
    };

    println!(
        "Tagged {}/{} series and {}/{} movies ({} failures)",
        report.tagged_series,
        report.scanned_series,
        report.tagged_movies,
        report.scanned_movies,
        report.failed
    );
    Ok(())
}

fn run<D: RowStore>(store: &D, page_size: usize) -> TagReport {
    ContentTagger::new(store).with_page_size(page_size).run()
}
