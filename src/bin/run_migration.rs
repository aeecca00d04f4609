#![forbid(unsafe_code)]

//! Applies a SQL file to the hosted database through `exec_sql`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use cinma_tools::config::{DEFAULT_ENV_PATH, Settings};
use cinma_tools::logging;
use cinma_tools::migration::{MigrationOutcome, run_migration};
use cinma_tools::supabase::SupabaseClient;
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a SQL migration file.")]
struct Cli {
    #[arg(value_name = "SQL_FILE")]
    sql_file: PathBuf,
    #[arg(long = "env-file", value_name = "PATH", default_value = DEFAULT_ENV_PATH)]
    env_file: PathBuf,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let settings = Settings::load(&cli.env_file)?;
    let client = SupabaseClient::new(&settings.require_supabase()?);

    info!("reading SQL file {}", cli.sql_file.display());
    let sql = fs::read_to_string(&cli.sql_file)
        .with_context(|| format!("Reading {}", cli.sql_file.display()))?;

    match run_migration(&client, &sql) {
        MigrationOutcome::Whole => println!("Migration applied."),
        MigrationOutcome::Split { ok, failed } => {
            println!("Migration applied statement by statement: {ok} ok, {failed} failed");
            if failed > 0 {
                bail!("{failed} statements failed");
            }
        }
    }
    Ok(())
}
