#![forbid(unsafe_code)]

//! Refreshes the non-TMDB catalogs: anime, Quran reciters, games, software.

use std::path::PathBuf;

use anyhow::{Result, bail};
use cinma_tools::config::{DEFAULT_ENV_PATH, Settings};
use cinma_tools::logging;
use cinma_tools::sources::{
    Catalog, GamesClient, JikanClient, Mp3QuranClient, RowSource, SoftwareCatalog, refresh,
    summarize,
};
use cinma_tools::store::{RowStore, SqliteStore};
use cinma_tools::supabase::SupabaseClient;
use clap::{Parser, ValueEnum};
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    Anime,
    Quran,
    Games,
    Software,
    All,
}

impl Target {
    fn catalogs(self) -> Vec<Catalog> {
        match self {
            Target::Anime => vec![Catalog::Anime],
            Target::Quran => vec![Catalog::Quran],
            Target::Games => vec![Catalog::Games],
            Target::Software => vec![Catalog::Software],
            Target::All => Catalog::ALL.to_vec(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Refresh the anime, Quran, games and software catalogs.")]
struct Cli {
    #[arg(value_enum, default_value_t = Target::All)]
    target: Target,
    #[arg(long = "env-file", value_name = "PATH", default_value = DEFAULT_ENV_PATH)]
    env_file: PathBuf,
    #[arg(long = "limit", value_name = "N", help = "Cap on items fetched per catalog")]
    limit: Option<usize>,
    #[arg(
        long = "local-db",
        value_name = "PATH",
        help = "Write to a local SQLite mirror instead of the hosted database"
    )]
    local_db: Option<PathBuf>,
}

fn source(catalog: Catalog, settings: &Settings, limit: Option<usize>) -> Box<dyn RowSource> {
    match catalog {
        Catalog::Anime => {
            let client = JikanClient::default();
            Box::new(match limit {
                Some(limit) => client.with_total(limit),
                None => client,
            })
        }
        Catalog::Quran => {
            let client = Mp3QuranClient::default();
            Box::new(match limit {
                Some(limit) => client.with_limit(limit),
                None => client,
            })
        }
        Catalog::Games => {
            let client = GamesClient::new(settings.rawg_api_key.clone());
            Box::new(match limit {
                Some(limit) => client.with_limit(limit),
                None => client,
            })
        }
        Catalog::Software => Box::new(SoftwareCatalog::default()),
    }
}

fn run<D: RowStore>(cli: &Cli, settings: &Settings, store: &D) -> usize {
    let mut failures = 0;
    for catalog in cli.target.catalogs() {
        match refresh(source(catalog, settings, cli.limit).as_ref(), store) {
            Ok(report) => println!("{}", summarize(catalog.table(), &report)),
            Err(err) => {
                error!("{catalog} refresh failed: {err:#}");
                failures += 1;
            }
        }
    }
    failures
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let settings = Settings::load(&cli.env_file)?;

    let failures = match &cli.local_db {
        Some(path) => run(&cli, &settings, &SqliteStore::open(path)?),
        None => {
            let client = SupabaseClient::new(&settings.require_supabase()?);
            run(&cli, &settings, &client)
        }
    };
    if failures > 0 {
        bail!("{failures} catalog refresh(es) failed");
    }
    Ok(())
}
