//! Command-line front end.
//!
//! Wires local files into the engine. Remote sources are deliberately not
//! wired here: the fetch capability is the embedding application's to
//! provide.

use clap::Parser;
use imprint::Engine;
use imprint_cache::PromptCache;
use imprint_config::Config;
use imprint_fetch::{FileSource, SourceHandle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "imprint", version, about = "Recover embedded AI-generation prompts from images")]
struct Cli {
    /// Image files to inspect.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Config file stem (probes .toml/.yaml/.json extensions).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log at debug level instead of warnings only.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("imprint={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let config = match Config::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("imprint: {error}");
            return ExitCode::FAILURE;
        },
    };

    let cache = match open_cache(&config).await {
        Ok(cache) => cache,
        Err(error) => {
            eprintln!("imprint: cache unavailable: {error}");
            return ExitCode::FAILURE;
        },
    };

    let engine = Engine::new(config, cache);
    let mut found_any = false;
    for path in &cli.paths {
        let locator = path.display().to_string();
        let source: SourceHandle = Arc::new(FileSource::new(path.clone()));
        match engine.extract(&locator, source).await {
            Some(prompt) => {
                found_any = true;
                println!("{locator}:\n{prompt}\n");
            },
            None => println!("{locator}: no prompt found\n"),
        }
    }
    engine.flush().await;

    if found_any { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

/// Open the persistent cache, falling back to an in-memory one so a broken
/// cache directory never blocks extraction.
async fn open_cache(config: &Config) -> imprint_cache::error::Result<PromptCache> {
    if let Some(path) = config.cache_db_path() {
        if let Some(parent) = path.parent() {
            if let Err(error) = tokio::fs::create_dir_all(parent).await {
                debug!(%error, "could not create cache directory");
            }
        }
        match PromptCache::open(&path).await {
            Ok(cache) => return Ok(cache),
            Err(error) => warn!(%error, path = %path.display(), "falling back to in-memory cache"),
        }
    }
    PromptCache::ephemeral().await
}
