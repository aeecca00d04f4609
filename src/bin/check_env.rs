#![forbid(unsafe_code)]

//! Prints which settings are present, masking secrets, and optionally pings
//! the hosted database and TMDB with them.

use std::path::PathBuf;

use anyhow::{Result, bail};
use cinma_tools::catalog::{MediaKind, Table};
use cinma_tools::config::{DEFAULT_ENV_PATH, KNOWN_KEYS, Settings, read_env_file};
use cinma_tools::logging;
use cinma_tools::security::mask_secret;
use cinma_tools::store::RowStore;
use cinma_tools::supabase::SupabaseClient;
use cinma_tools::tmdb::TmdbClient;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect the environment configuration.")]
struct Cli {
    #[arg(long = "env-file", value_name = "PATH", default_value = DEFAULT_ENV_PATH)]
    env_file: PathBuf,
    #[arg(long = "ping", help = "Also call the database and TMDB")]
    ping: bool,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    match read_env_file(&cli.env_file)? {
        Some(file) => {
            println!("{}:", cli.env_file.display());
            for key in file.keys() {
                let value = file.get(key).unwrap_or_default();
                let shown = if key.contains("URL") || key.contains("HOST") || key.contains("PORT") {
                    value.to_string()
                } else {
                    mask_secret(value)
                };
                let note = if KNOWN_KEYS.contains(&key) { "" } else { "  (unused)" };
                println!("  {key} = {shown}{note}");
            }
        }
        None => println!("{} not found; using the process environment", cli.env_file.display()),
    }

    let settings = Settings::load(&cli.env_file)?;
    println!();
    println!("Supabase URL:  {}", settings.supabase_url.as_deref().unwrap_or("missing"));
    println!("Service key:   {}", present(settings.service_key.as_deref()));
    println!("Anon key:      {}", present(settings.anon_key.as_deref()));
    println!("TMDB key:      {}", present(settings.tmdb_api_key.as_deref()));
    println!("Admin token:   {}", present(settings.admin_token.as_deref()));
    println!("API listen:    {}:{}", settings.api_host, settings.api_port);

    if !cli.ping {
        return Ok(());
    }

    let mut failures = 0;
    let client = SupabaseClient::new(&settings.require_supabase()?);
    match client.count(Table::Movies.name()) {
        Ok(count) => println!("Database:      ok ({count} movies)"),
        Err(err) => {
            failures += 1;
            println!("Database:      error: {err:#}");
        }
    }
    let tmdb = TmdbClient::new(settings.require_tmdb()?);
    match tmdb.trending(MediaKind::Movie) {
        Ok(page) => println!("TMDB:          ok ({} trending movies)", page.results.len()),
        Err(err) => {
            failures += 1;
            println!("TMDB:          error: {err:#}");
        }
    }
    if failures > 0 {
        bail!("{failures} connectivity checks failed");
    }
    Ok(())
}

fn present(value: Option<&str>) -> String {
    value.map(mask_secret).unwrap_or_else(|| "missing".to_string())
}
