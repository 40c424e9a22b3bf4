//! `kinocrawl` CLI - search movie catalogs and resolve streams from a terminal

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use kinocrawl::{Crawler, CrawlerConfig, SearchSession};

#[derive(Parser)]
#[command(name = "kinocrawl")]
#[command(about = "Search movie catalog sites and resolve playable streams")]
#[command(version)]
struct Cli {
    /// Providers file (defaults to the user config dir, then the built-in set)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured providers and extractors
    Providers,

    /// Search providers and print one page of merged results
    Search {
        /// Search query
        query: String,

        /// Providers to query (comma-separated, default set when omitted)
        #[arg(short, long, value_delimiter = ',')]
        providers: Vec<String>,

        /// Page to print, starting at 1
        #[arg(long, default_value = "1")]
        page: usize,

        /// Save the session to this file for `more`
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Print the next page of a saved search session
    More {
        /// Session file written by `search --save`
        session: PathBuf,
    },

    /// Show title, trailer and files of one item
    Info {
        /// Provider name
        provider: String,

        /// Item id from search results
        id: String,
    },

    /// Resolve a deferred source to playable urls
    Resolve {
        /// Extractor type (e.g. voidboost, ashdi)
        extractor: String,

        /// Source id from the file's asyncSource
        source_id: String,

        /// Extra params as key=value (repeatable)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

#[derive(Serialize)]
struct ProviderListing<'a> {
    providers: Vec<&'a str>,
    default_providers: &'a [String],
    extractors: Vec<&'a str>,
    page_size: usize,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "kinocrawl=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = CrawlerConfig::load(cli.config.as_deref())?;
    let crawler = Crawler::from_config(&config)?;

    match cli.command {
        Commands::Providers => {
            print_json(&ProviderListing {
                providers: crawler.provider_names(),
                default_providers: &config.default_providers,
                extractors: crawler.extractor_kinds(),
                page_size: crawler.page_size(),
            })?;
        }
        Commands::Search {
            query,
            providers,
            page,
            save,
        } => {
            if page == 0 {
                bail!("pages start at 1");
            }
            let mut session = crawler.start_session(&providers, &query).await;
            if session.is_empty() {
                eprintln!("No results for {query:?}");
            }
            session.page = page;
            print_json(&crawler.page(&session, page))?;

            if let Some(path) = save {
                std::fs::write(&path, serde_json::to_string(&session)?)
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
        }
        Commands::More { session: path } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let mut session: SearchSession = serde_json::from_str(&text)
                .with_context(|| format!("{} is not a search session", path.display()))?;

            let Some(next) = session.show_more(crawler.page_size()) else {
                eprintln!("No more results for {:?}", session.query);
                return Ok(());
            };
            print_json(&next)?;
            std::fs::write(&path, serde_json::to_string(&session)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        Commands::Info { provider, id } => {
            let info = crawler.get_info(&provider, &id).await?;
            print_json(&info)?;
        }
        Commands::Resolve {
            extractor,
            source_id,
            params,
        } => {
            let params: BTreeMap<String, String> = params.into_iter().collect();
            let urls = crawler.resolve_source(&extractor, &source_id, &params).await?;
            print_json(&urls)?;
        }
    }

    Ok(())
}
