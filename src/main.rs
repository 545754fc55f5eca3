mod cache;
mod catalog;
mod config;
mod error;
mod http;
mod models;
mod normalize;
mod query;
mod selector;

use anyhow::Result;
use cache::ResponseStore;
use catalog::{ApiHeaders, CatalogClient};
use clap::{Args, Parser, Subcommand};
use config::Configuration;
use error::CatalogError;
use http::HttpClient;
use models::{QueryFilters, TitleRecord, TitleType, ALL_REGIONS};
use query::Endpoints;
use std::io::{self, BufRead, Write};
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pick a random title matching the filters
    Roll(RollArgs),
    /// List the available genres
    Genres,
    /// List the available regions
    Regions,
    /// Inspect or clear the local response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Args)]
struct RollArgs {
    /// Region to search, as listed by `regions`
    #[arg(short, long, default_value = ALL_REGIONS)]
    region: String,

    /// Genre to include, as listed by `genres`; repeat for several.
    /// Every genre is included when omitted.
    #[arg(short, long = "genre")]
    genres: Vec<String>,

    #[arg(short = 't', long = "type", value_enum, default_value = "any")]
    title_type: TitleType,

    #[arg(long, default_value_t = 0.0)]
    min_rating: f32,

    #[arg(long, default_value_t = 10.0)]
    max_rating: f32,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show the cache location, file count and size
    Info,
    /// Delete every cached response
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so listings on stdout stay clean
    tracing_subscriber::fmt()
        .with_env_filter(&cli.log_level)
        .with_writer(io::stderr)
        .init();

    info!("Starting catalog roulette v{}", env!("CARGO_PKG_VERSION"));

    let config = Configuration::load(&cli.config)?;
    let store = ResponseStore::open(config.store_config()?);

    match cli.command {
        Command::Cache { action } => {
            run_cache(&store, action);
            Ok(())
        }
        Command::Roll(args) => roll(&build_client(&config, store)?, args).await,
        Command::Genres => list_genres(&build_client(&config, store)?).await,
        Command::Regions => list_regions(&build_client(&config, store)?).await,
    }
}

fn build_client(config: &Configuration, store: ResponseStore) -> Result<CatalogClient<HttpClient>> {
    let api_key = match config.api_key() {
        Some(key) => key,
        None => {
            warn!("No API key found in {} or the configuration file", config::API_KEY_ENV);
            prompt_api_key()?
        }
    };

    let http = HttpClient::new(config.request_timeout())?;
    let endpoints = Endpoints::new(config.base_url()?);
    let headers = ApiHeaders::new(config.api_host(), api_key);

    let client = CatalogClient::new(http, store, endpoints, headers);
    debug!("Caching responses in {}", client.store().directory().display());
    Ok(client)
}

/// Ask for a key on stdin until something non-blank is entered.
fn prompt_api_key() -> Result<String> {
    let stdin = io::stdin();
    loop {
        eprint!("Catalog API key not found. Please provide one here: ");
        io::stderr().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            anyhow::bail!("no API key provided");
        }

        let key: String = line.split_whitespace().collect();
        if !key.is_empty() {
            return Ok(key);
        }
    }
}

async fn roll(client: &CatalogClient<HttpClient>, args: RollArgs) -> Result<()> {
    if args.min_rating > args.max_rating {
        anyhow::bail!("The minimum rating value must be less than the maximum rating value.");
    }

    let mut filters = QueryFilters::default()
        .with_region(args.region)
        .with_title_type(args.title_type)
        .with_ratings(args.min_rating, args.max_rating);
    if !args.genres.is_empty() {
        filters = filters.with_genres(args.genres);
    }

    match client.fetch_titles(&filters).await {
        Ok(titles) => {
            print_title(selector::pick(&titles)?);
            Ok(())
        }
        Err(e) if e.is_no_match() => {
            println!("We found no matching Netflix titles! Perhaps try again with different filters?");
            Ok(())
        }
        Err(e) => Err(explain(e)),
    }
}

async fn list_genres(client: &CatalogClient<HttpClient>) -> Result<()> {
    let genres = client.fetch_genres().await.map_err(explain)?;
    info!("{} genres available", genres.len());
    for name in genres.names() {
        println!("{}", name);
    }
    Ok(())
}

async fn list_regions(client: &CatalogClient<HttpClient>) -> Result<()> {
    let regions = client.fetch_regions().await.map_err(explain)?;
    info!("{} regions available", regions.len() - 1);
    for name in regions.names() {
        println!("{}", name);
    }
    Ok(())
}

fn run_cache(store: &ResponseStore, action: CacheAction) {
    if let CacheAction::Clear = action {
        let removed = store.clear();
        info!("Removed {} cached responses", removed);
    }

    println!("Location:  {}", store.directory().display());
    println!("Responses: {}", store.file_count());
    println!("Size:      {:.2} MB", store.total_size_bytes() as f64 / 1e6);
    println!("Max age:   {} days", store.max_age_days());
}

/// Attach the message a user should see for each failure kind.
fn explain(err: CatalogError) -> anyhow::Error {
    let message = if err.is_retryable() {
        "There was a problem contacting the Netflix library. Please try again."
    } else if err.needs_update() {
        "It looks like this program needs to be updated. We are unable to read the response from the Netflix catalogue."
    } else if err.is_no_match() {
        "We found no matching Netflix titles!"
    } else if matches!(err, CatalogError::PreconditionViolation(_)) {
        "The selected filters are not valid. Check `genres` and `regions` for the accepted names."
    } else {
        "Something went wrong while looking up the catalogue."
    };
    error!("{}", err);
    anyhow::Error::new(err).context(message)
}

fn print_title(title: &TitleRecord) {
    let year = title
        .release_year
        .map_or_else(|| "unknown year".to_string(), |y| y.to_string());
    println!("{} ({}) - {}", title.name, year, title.kind);

    let mut details = Vec::new();
    if let Some(rating) = title.rating {
        details.push(format!("Rating: {:.1}/10", rating));
    }
    if let Some(minutes) = title.runtime_minutes {
        details.push(format!("Runtime: {}h {:02}m", minutes / 60, minutes % 60));
    }
    if !details.is_empty() {
        println!("{}", details.join(" | "));
    }

    println!();
    println!("{}", title.synopsis);
    println!();
    println!("Poster: {}", title.poster_url);
    println!("Watch:  {}", title.netflix_url());
}
