#![forbid(unsafe_code)]

//! Grants a role to an existing account.

use std::path::PathBuf;

use anyhow::{Result, bail};
use cinma_tools::admin::{Promoter, Role};
use cinma_tools::config::{DEFAULT_ENV_PATH, Settings};
use cinma_tools::logging;
use cinma_tools::supabase::SupabaseClient;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Promote an account to admin or supervisor.")]
struct Cli {
    #[arg(value_name = "EMAIL")]
    email: String,
    #[arg(long = "role", value_name = "ROLE", default_value = "admin")]
    role: Role,
    #[arg(long = "env-file", value_name = "PATH", default_value = DEFAULT_ENV_PATH)]
    env_file: PathBuf,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let settings = Settings::load(&cli.env_file)?;
    let client = SupabaseClient::new(&settings.require_supabase()?);

    let report = Promoter::new(&client, &client).promote(&cli.email, cli.role)?;
    println!("profiles:      {}", mark(report.in_profiles));
    println!("app_metadata:  {}", mark(report.in_app_metadata));
    println!("user_metadata: {}", mark(report.in_user_metadata));

    if !report.is_complete() {
        bail!("{} is not fully promoted to {}", cli.email, cli.role);
    }
    println!("{} is now {}", cli.email, cli.role);
    Ok(())
}

fn mark(ok: bool) -> &'static str {
    if ok { "ok" } else { "missing" }
}
