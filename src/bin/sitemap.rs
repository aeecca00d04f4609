#![forbid(unsafe_code)]

//! Writes `sitemap.xml` from the live catalog.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use cinma_tools::config::{DEFAULT_ENV_PATH, Settings};
use cinma_tools::logging;
use cinma_tools::sitemap::{DEFAULT_OUTPUT, SITE_URL, collect_entries, render};
use cinma_tools::supabase::SupabaseClient;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate sitemap.xml for the public site.")]
struct Cli {
    #[arg(long = "env-file", value_name = "PATH", default_value = DEFAULT_ENV_PATH)]
    env_file: PathBuf,
    #[arg(long = "output", value_name = "PATH", default_value = DEFAULT_OUTPUT)]
    output: PathBuf,
    #[arg(long = "base-url", value_name = "URL", default_value = SITE_URL)]
    base_url: String,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let settings = Settings::load(&cli.env_file)?;
    let client = SupabaseClient::new(&settings.require_supabase()?);

    let base_url = cli.base_url.trim_end_matches('/');
    let entries = collect_entries(&client, base_url, Local::now().date_naive());
    if let Some(parent) = cli.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Creating {}", parent.display()))?;
    }
    fs::write(&cli.output, render(&entries))
        .with_context(|| format!("Writing {}", cli.output.display()))?;
    println!(
        "Sitemap generated with {} URLs at {}",
        entries.len(),
        cli.output.display()
    );
    Ok(())
}
