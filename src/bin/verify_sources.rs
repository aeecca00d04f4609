#![forbid(unsafe_code)]

//! Checks that every embed server answers for a TMDB title.

use anyhow::Result;
use cinma_tools::catalog::MediaKind;
use cinma_tools::embed::Episode;
use cinma_tools::linkcheck::LinkChecker;
use cinma_tools::logging;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Check embed servers for a TMDB id.")]
struct Cli {
    #[arg(value_name = "TMDB_ID")]
    id: u64,
    #[arg(long = "tv", help = "Treat the id as a series")]
    tv: bool,
    #[arg(long = "season", default_value_t = 1)]
    season: u32,
    #[arg(long = "episode", default_value_t = 1)]
    episode: u32,
    #[arg(long = "server", value_name = "INDEX", help = "Check only this server (0-based)")]
    server: Option<usize>,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let kind = if cli.tv { MediaKind::Tv } else { MediaKind::Movie };
    let episode = Episode {
        season: cli.season.max(1),
        episode: cli.episode.max(1),
    };

    let checker = LinkChecker::default();
    let checks = match cli.server {
        Some(index) => vec![checker.verify_source(kind, cli.id, episode, index)],
        None => checker.verify_sources(kind, cli.id, episode),
    };
    for check in &checks {
        let verdict = match (&check.status.status, &check.status.error) {
            (Some(code), _) if check.status.valid => format!("ok ({code})"),
            (_, Some(err)) => format!("down ({err})"),
            _ => "down".to_string(),
        };
        println!("{:<8} {verdict:<24} {}", check.server.key(), check.url);
    }
    Ok(())
}
