use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

use gracile::config::Config;
use gracile::content::HttpPageScraper;
use gracile::feed::HttpFeedFetcher;
use gracile::net::build_client;
use gracile::pipeline::{ArticleCache, ArticleLimit, Pipeline, PipelineReport};
use gracile::storage::{Database, StorageError, StoredArticle};
use gracile::util::truncate_to_width;

/// Get the config directory path (~/.config/gracile/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gracile"))
}

#[derive(Parser, Debug)]
#[command(
    name = "gracile",
    version,
    about = "Fetch RSS/Atom feeds, scrape their articles and cache them"
)]
struct Args {
    /// Config file [default: ~/.config/gracile/config.toml]
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Article database, overrides `database_path` from the config
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a feed, scrape its articles and cache the new ones
    Fetch {
        url: String,

        /// Maximum number of articles, -1 for all
        #[arg(long, allow_negative_numbers = true)]
        max: Option<i64>,

        /// Seconds allowed for scraping before remaining pages are skipped
        #[arg(long, value_name = "SECS")]
        deadline: Option<u64>,

        /// Pages scraped at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List cached articles of a feed, newest first
    List {
        url: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },
    /// Remove a feed and every article no other feed references
    Remove { url: String },
    /// Re-read a feed's title, homepage and image into the cache
    Refresh { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = match args.db.clone().or_else(|| config.database_path.clone()) {
        Some(path) => path,
        None => {
            std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
            config_dir.join("articles.db")
        }
    };
    let db = open_database(&db_path).await?;

    match args.command {
        Command::Fetch {
            url,
            max,
            deadline,
            concurrency,
            json,
        } => {
            let policy = config.host_policy();
            let client =
                build_client(&config.user_agent, policy).context("Failed to build HTTP client")?;
            let fetcher = HttpFeedFetcher::new(client.clone())
                .with_timeout(config.feed_timeout())
                .with_max_bytes(config.max_feed_bytes)
                .with_host_policy(policy);
            let scraper = HttpPageScraper::new(client)
                .with_timeout(config.scrape_timeout())
                .with_max_bytes(config.max_page_bytes)
                .with_host_policy(policy);
            let pipeline = Pipeline::new(fetcher, scraper, db)
                .with_concurrency(concurrency.unwrap_or_else(|| config.scrape_concurrency()));

            let limit = ArticleLimit::try_from(max.unwrap_or(config.default_max_articles))?;
            let deadline = deadline
                .map(Duration::from_secs)
                .or_else(|| config.batch_deadline())
                .map(|budget| Instant::now() + budget);

            let report = pipeline
                .run(&url, limit, deadline)
                .await
                .with_context(|| format!("Failed to cache feed {url}"))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Command::List { url, limit, json } => {
            let cache = ArticleCache::new(db);
            let articles = cache
                .articles_for_source(url.trim(), limit)
                .await
                .context("Failed to load cached articles")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&articles)?);
            } else if articles.is_empty() {
                println!("No cached articles for {url}");
            } else {
                print_stored(&articles);
            }
        }
        Command::Remove { url } => {
            let cache = ArticleCache::new(db);
            let removed = cache
                .remove_source(url.trim())
                .await
                .context("Failed to remove feed")?;
            if removed.source_removed {
                println!(
                    "Removed {url}: {} articles deleted, {} kept for other feeds",
                    removed.articles_removed,
                    removed.links_removed - removed.articles_removed
                );
            } else {
                println!("{url} is not cached");
            }
        }
        Command::Refresh { url } => {
            let client = build_client(&config.user_agent, config.host_policy())
                .context("Failed to build HTTP client")?;
            let fetcher = HttpFeedFetcher::new(client)
                .with_timeout(config.feed_timeout())
                .with_max_bytes(config.max_feed_bytes)
                .with_host_policy(config.host_policy());
            let handle = ArticleCache::new(db)
                .refresh_source(url.trim(), &fetcher)
                .await
                .with_context(|| format!("Failed to refresh feed {url}"))?;
            println!(
                "{}: {}",
                handle.url,
                handle.title.as_deref().unwrap_or("(untitled)")
            );
        }
    }

    Ok(())
}

async fn open_database(path: &std::path::Path) -> Result<Database> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(path_str).await {
        Ok(db) => Ok(db),
        Err(StorageError::InstanceLocked) => {
            eprintln!("Error: {}", StorageError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

fn terminal_width() -> usize {
    crossterm::terminal::size()
        .map(|(cols, _)| cols as usize)
        .unwrap_or(80)
}

fn print_line(date: Option<chrono::DateTime<chrono::Utc>>, title: &str, url: &str, width: usize) {
    let date = date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "----------".to_string());
    let label = if title.is_empty() { url } else { title };
    let line = format!("{date}  {label}");
    println!("{}", truncate_to_width(&line, width));
}

fn print_report(report: &PipelineReport) {
    let width = terminal_width();
    for article in &report.articles {
        print_line(article.publish_date, &article.title, &article.url, width);
    }
    for entry in &report.dropped {
        eprintln!(
            "Skipped entry #{} ({}): {}",
            entry.index + 1,
            entry.title.as_deref().unwrap_or("untitled"),
            entry.reason
        );
    }
    println!(
        "{}: {} new of {} articles, {} dropped, {} without page data",
        report.source.title.as_deref().unwrap_or(&report.source.url),
        report.inserted,
        report.articles.len(),
        report.dropped.len(),
        report.scrape_failures
    );
}

fn print_stored(articles: &[StoredArticle]) {
    let width = terminal_width();
    for article in articles {
        print_line(article.publish_date, &article.title, &article.url, width);
    }
}
