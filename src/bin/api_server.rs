#![forbid(unsafe_code)]

//! HTTP API and static frontend host.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cinma_tools::catalog::Table;
use cinma_tools::config::{DEFAULT_ENV_PATH, Settings};
use cinma_tools::engine::{ContentEngine, EngineOptions};
use cinma_tools::logging;
use cinma_tools::server::{self, AppState, SyncJob};
use cinma_tools::sources::{JikanClient, Mp3QuranClient, RowSource, refresh, summarize};
use cinma_tools::supabase::SupabaseClient;
use cinma_tools::tagger::ContentTagger;
use cinma_tools::tmdb::TmdbClient;
use clap::Parser;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve the catalog API and the built site.")]
struct Cli {
    #[arg(long = "env-file", value_name = "PATH", default_value = DEFAULT_ENV_PATH)]
    env_file: PathBuf,
    #[arg(long = "port", value_name = "PORT", help = "Override API_PORT")]
    port: Option<u16>,
    #[arg(long = "www-root", value_name = "PATH", help = "Override WWW_ROOT")]
    www_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let settings = Settings::load(&cli.env_file)?;

    let client = SupabaseClient::new(&settings.require_supabase()?);
    let www_root = cli.www_root.unwrap_or_else(|| settings.www_root.clone());
    let mut state = AppState::new(Arc::new(client.clone()), www_root)
        .with_admin_token(settings.admin_token.clone())
        .with_allowed_origins(settings.web_origins.clone())
        .with_refresh_job(Table::Anime, refresh_job(JikanClient::default(), client.clone()))
        .with_refresh_job(
            Table::QuranReciters,
            refresh_job(Mp3QuranClient::default(), client.clone()),
        );

    match settings.require_tmdb() {
        Ok(key) => {
            let tmdb = TmdbClient::new(key);
            state = state
                .with_tmdb(tmdb.clone())
                .with_sync_job(sync_job(tmdb, client));
        }
        Err(err) => warn!("search and sync disabled: {err:#}"),
    }
    if settings.admin_token.is_none() {
        warn!("ADMIN_SYNC_TOKEN is not set; admin endpoints are open");
    }

    let port = cli.port.unwrap_or(settings.api_port);
    let addr = SocketAddr::new(
        settings
            .api_host
            .parse()
            .with_context(|| format!("Parsing API_HOST {:?}", settings.api_host))?,
        port,
    );
    server::serve(state, addr).await
}

/// Engine run followed by a tagger pass.
fn sync_job(tmdb: TmdbClient, client: SupabaseClient) -> SyncJob {
    Arc::new(move || {
        let ingest = ContentEngine::new(&tmdb, &client, EngineOptions::default()).run();
        let tags = ContentTagger::new(&client).run();
        Ok(format!(
            "{} inserted, {} updated, {} failed; tagged {} series and {} movies",
            ingest.inserted, ingest.updated, ingest.failed, tags.tagged_series, tags.tagged_movies
        ))
    })
}

/// One catalog refresh, summarized the way `fetch_catalogs` prints it.
fn refresh_job<S>(source: S, client: SupabaseClient) -> SyncJob
where
    S: RowSource + Send + Sync + 'static,
{
    Arc::new(move || {
        let report = refresh(&source, &client)?;
        Ok(summarize(source.table(), &report))
    })
}
