mod config;
mod json_library;
mod logging;
mod models;
mod ports;
mod retry;
mod services;
mod spotify_rs;
#[cfg(test)]
mod test_utils;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context};

use crate::{
    config::Config,
    json_library::JsonLibrary,
    logging::setup_logging,
    ports::library::{MusicLibrary, ensure_writable},
    services::{
        follow::ArtistFollowPolicy,
        matching::{
            CandidateSearch, ConsoleResolver, MappingCache, MatchOptions, MatchingEngine,
            RemapScope,
        },
        sync::{NamingRules, SyncEngine},
    },
    spotify_rs::SpotifyClient,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "CRATE_MIRROR_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Console log level (default: warn)
    #[arg(long, default_value = "warn", global = true, env = "LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// File log level (default: debug)
    #[arg(long, default_value = "debug", global = true)]
    log_file_level: log::LevelFilter,

    /// Path to log file
    #[arg(long, env = "CRATE_MIRROR_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Match source tracks and mirror prefixed playlists into the target library
    Sync {
        /// Compute the plan without changing the target library
        #[arg(long)]
        dry_run: bool,

        /// Ask on the console when no candidate is good enough
        #[arg(short, long)]
        interactive: bool,

        /// Re-match cached decisions, optionally only those of one algorithm version
        #[arg(long, value_name = "VERSION", num_args = 0..=1, default_missing_value = "")]
        remap: Option<String>,

        /// Follow artists that appear often in the synced playlists
        #[arg(long)]
        follow: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    #[command(subcommand)]
    Cache(CacheCommands),
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum CacheCommands {
    /// Remove cached match decisions
    Clear {
        /// Only remove decisions made by this algorithm version
        #[arg(long, value_name = "VERSION")]
        algorithm: Option<String>,
    },
    /// Print cache statistics
    Stats,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

fn remap_scope(remap: Option<String>) -> RemapScope {
    match remap {
        None => RemapScope::None,
        Some(version) if version.is_empty() => RemapScope::All,
        Some(version) => RemapScope::Version(version),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    if let Some(config) = path {
        Config::from_file(&config)
    } else {
        Config::load()
    }
    .with_context(|| "Failed to load crate-mirror config")
}

struct SyncArgs {
    dry_run: bool,
    interactive: bool,
    remap: RemapScope,
    follow: bool,
    json: bool,
}

async fn sync(config: &Config, args: SyncArgs) -> Result<()> {
    let retry = config.retry_policy();

    let target: Arc<dyn MusicLibrary> = Arc::new(SpotifyClient::new(
        config.access_token()?,
        &config.target.api_base,
        config.target.requests_per_second,
    )?);
    ensure_writable(target.as_ref(), "target")?;

    let source: Arc<dyn MusicLibrary> = Arc::new(JsonLibrary::load(&config.library_path()).await?);

    let cache = MappingCache::load(config.cache_path());
    log::info!(
        "Loaded {} cached decisions from {}",
        cache.len(),
        cache.path().display()
    );

    let options = MatchOptions {
        remap: args.remap,
        interactive: args.interactive,
        concurrency: config.matching.concurrency,
        max_candidates_shown: config.matching.max_candidates_shown,
    };
    let mut matcher = MatchingEngine::new(
        CandidateSearch::new(target.clone(), retry),
        cache,
        config.matching.save_every,
        options,
    );
    if args.interactive {
        matcher = matcher.with_resolver(Arc::new(ConsoleResolver::new()));
    }

    let follow = (args.follow || config.follow.enabled)
        .then(|| ArtistFollowPolicy::new(target.clone(), config.follow.threshold, retry));

    let naming = NamingRules::new(
        config.sync.playlist_prefix.clone(),
        config.sync.playlist_separator.clone(),
        config.source.ignore_playlists.clone(),
        config.sync.exclude_from_playlist_names.clone(),
    );

    let report = SyncEngine::new(source, target, naming, retry)
        .dry_run(args.dry_run)
        .run(&matcher, follow.as_ref())
        .await?;

    let cache = matcher.into_cache();
    log::debug!("Mapping cache holds {} decisions", cache.len());

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).wrap_err("Failed to serialize report")?
        );
    } else {
        println!("{}", report);
    }
    if report.has_failures() {
        log::warn!("{} playlists failed to sync", report.failures.len());
    }
    Ok(())
}

fn cache_command(config: &Config, command: CacheCommands) -> Result<()> {
    let mut cache = MappingCache::load(config.cache_path());
    match command {
        CacheCommands::Clear { algorithm } => {
            let cleared = match algorithm {
                Some(version) => cache.clear_by_algorithm(&version)?,
                None => cache.clear_all()?,
            };
            println!("Removed {} cached decisions", cleared);
        }
        CacheCommands::Stats => {
            if cache.is_empty() {
                println!("Mapping cache at {} is empty", cache.path().display());
                return Ok(());
            }
            let stats = cache.stats();
            println!("Mapping cache: {}", cache.path().display());
            println!(
                "  {} decisions: {} matched, {} confirmed non-matches, {} manual",
                stats.total, stats.matched, stats.non_matches, stats.manual_overrides
            );
            for (version, count) in &stats.by_algorithm {
                println!("  {}: {}", version, count);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    setup_logging(args.log_level, args.log_file.clone(), args.log_file_level)?;

    log::debug!("crate-mirror starting");

    match args.command {
        Commands::Sync {
            dry_run,
            interactive,
            remap,
            follow,
            json,
        } => {
            let config = load_config(args.config)?;
            sync(
                &config,
                SyncArgs {
                    dry_run,
                    interactive,
                    remap: remap_scope(remap),
                    follow,
                    json,
                },
            )
            .await?;
            log::info!("Sync command completed");
        }
        Commands::Cache(command) => {
            let config = load_config(args.config)?;
            cache_command(&config, command)?;
        }
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                log::debug!("Creating default config");
                let path = Config::create_default()?;
                println!("Config written to {}", path.display());
            }
            ConfigCommands::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap_flag_parsing() {
        let parse = |argv: &[&str]| match Args::parse_from(argv.iter().copied()).command {
            Commands::Sync { remap, .. } => remap_scope(remap),
            _ => panic!("expected sync"),
        };

        assert_eq!(parse(&["crate-mirror", "sync"]), RemapScope::None);
        assert_eq!(parse(&["crate-mirror", "sync", "--remap"]), RemapScope::All);
        assert_eq!(
            parse(&["crate-mirror", "sync", "--remap", "levenshtein-v0"]),
            RemapScope::Version("levenshtein-v0".into())
        );
    }

    #[test]
    fn test_cache_clear_by_algorithm_flag() {
        let args = Args::parse_from(["crate-mirror", "cache", "clear", "--algorithm", "manual"]);
        match args.command {
            Commands::Cache(CacheCommands::Clear { algorithm }) => {
                assert_eq!(algorithm.as_deref(), Some("manual"))
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
