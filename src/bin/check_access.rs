#![forbid(unsafe_code)]

//! Verifies that `error_logs` accepts anonymous reports.

use std::path::PathBuf;

use anyhow::{Result, bail};
use cinma_tools::access::check_error_logs;
use cinma_tools::config::{DEFAULT_ENV_PATH, Settings};
use cinma_tools::logging;
use cinma_tools::supabase::SupabaseClient;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Check row-level security on error_logs.")]
struct Cli {
    #[arg(long = "env-file", value_name = "PATH", default_value = DEFAULT_ENV_PATH)]
    env_file: PathBuf,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let settings = Settings::load(&cli.env_file)?;
    let admin = SupabaseClient::new(&settings.require_supabase()?);
    let anon = SupabaseClient::new(&settings.require_anon()?);

    let report = check_error_logs(&admin, &anon);
    println!("privileged insert: {}", report.admin_insert);
    println!("anonymous insert:  {}", report.anon_insert);
    println!("anonymous read:    {}", report.anon_read);

    if report.table_missing {
        bail!("error_logs does not exist; run its migration first");
    }
    if !report.all_passed() {
        bail!("error_logs access is not configured correctly");
    }
    Ok(())
}
