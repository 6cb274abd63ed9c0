//! sift-scrape - Collect posts from user timelines within a time window

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use libtimesift::error::TimesiftError;
use libtimesift::platforms::x::XClient;
use libtimesift::retry::{Backoff, RetryPolicy};
use libtimesift::types::{parse_date, PostRecord, ScrapeRequest, TimeWindow, UserIdentifier};
use libtimesift::{export, logging, BatchReport, Config, CredentialSet, Scraper, Session};

/// Records shown in the text preview
const PREVIEW_LIMIT: usize = 10;
/// Characters of post text shown per preview line
const PREVIEW_WIDTH: usize = 80;

#[derive(Parser, Debug)]
#[command(name = "sift-scrape")]
#[command(version, about = "Collect posts from user timelines within a time window")]
#[command(long_about = r#"Collect posts from one or more user timelines, newest first.

Paging stops as soon as a post older than --since (or --start-date) is seen,
so narrow windows on busy accounts stay cheap.

EXAMPLES:
    # Last 50 posts of one user
    sift-scrape rustlang --max 50

    # Everything posted on two days (end date inclusive)
    sift-scrape rustlang --start-date 2024-01-02 --end-date 2024-01-03

    # Exact instants, several users, exported to files
    sift-scrape alice bob --since 2024-01-02T00:00:00Z --until 2024-01-04T00:00:00Z \
        --json posts.json --csv posts.csv

    # JSON on stdout for scripting
    sift-scrape rustlang -n 20 --format json | jq '.[].text'

EXIT CODES:
    0 - Every user was scraped completely
    1 - A user failed, or an export could not be written
    2 - Cookies are missing, invalid or were rejected
    3 - Invalid input (user, date or range)
"#)]
struct Cli {
    /// Handles (with or without @) or numeric user ids
    #[arg(required = true, value_name = "USER")]
    users: Vec<String>,

    /// Cookie file exported from a logged-in browser (overrides config)
    #[arg(long, value_name = "PATH")]
    cookies: Option<PathBuf>,

    /// Keep posts at or after this instant (ISO 8601 or YYYY-MM-DD)
    #[arg(long, value_name = "INSTANT", conflicts_with_all = ["start_date", "end_date"])]
    since: Option<String>,

    /// Keep posts before this instant (ISO 8601 or YYYY-MM-DD)
    #[arg(long, value_name = "INSTANT", conflicts_with_all = ["start_date", "end_date"])]
    until: Option<String>,

    /// First day to keep (YYYY-MM-DD, UTC)
    #[arg(long, value_name = "DATE", requires = "end_date")]
    start_date: Option<String>,

    /// Last day to keep, inclusive (YYYY-MM-DD, UTC)
    #[arg(long, value_name = "DATE", requires = "start_date")]
    end_date: Option<String>,

    /// Maximum posts per user
    #[arg(short = 'n', long = "max", value_name = "N")]
    max_posts: Option<usize>,

    /// Write all records to this file as a JSON array
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,

    /// Write all records to this file as CSV
    #[arg(long, value_name = "PATH")]
    csv: Option<PathBuf>,

    /// Output format for stdout
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Retries per request after the first attempt (overrides config)
    #[arg(long, value_name = "N")]
    retry_count: Option<u32>,

    /// Delay before the first retry, e.g. 5s or 500ms (overrides config)
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    retry_delay: Option<Duration>,

    /// Pause between users, e.g. 2s (overrides config)
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    user_delay: Option<Duration>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::config_from_env(cli.verbose).init();
    tracing::debug!("sift-scrape started with args: {:?}", cli);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<TimesiftError>()
                .map_or(1, TimesiftError::exit_code);
            std::process::exit(code);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    // Validate everything the user typed before touching credentials or the network
    let users = cli
        .users
        .iter()
        .map(|u| u.parse::<UserIdentifier>())
        .collect::<libtimesift::Result<Vec<_>>>()?;
    let request = ScrapeRequest::new(build_window(&cli)?, cli.max_posts);

    let config = Config::load_or_default().context("Failed to load configuration")?;
    let cookie_path = cli
        .cookies
        .clone()
        .unwrap_or_else(|| config.credentials_path());
    let credentials = CredentialSet::load(&cookie_path)?;
    let session = Session::open(credentials, &config)?;

    let scraper = Scraper::new(Box::new(XClient::new(session)), retry_policy(&cli, &config))
        .with_user_delay(cli.user_delay.unwrap_or_else(|| config.scrape.user_delay()));

    let batch = if let [user] = users.as_slice() {
        BatchReport {
            reports: vec![scraper.scrape(user, &request).await],
        }
    } else {
        scraper.scrape_many(&users, &request).await
    };

    let mut code = batch_exit_code(&batch);
    for report in batch.failed() {
        if let Some(e) = report.error() {
            eprintln!("Error: {}: {}", report.user, e);
        }
    }

    let multi_user = users.len() > 1;
    let records = batch.into_records();

    if !write_exports(&cli, &records) {
        code = code.max(1);
    }

    match cli.format.as_str() {
        "json" => println!("{}", export::to_json(&records)?),
        _ if cli.json.is_none() && cli.csv.is_none() => print_preview(&records, multi_user),
        _ => {}
    }

    Ok(code)
}

fn build_window(cli: &Cli) -> libtimesift::Result<TimeWindow> {
    match (&cli.start_date, &cli.end_date) {
        (Some(start), Some(end)) => TimeWindow::from_dates(parse_date(start)?, parse_date(end)?),
        _ => TimeWindow::parse(cli.since.as_deref(), cli.until.as_deref()),
    }
}

fn retry_policy(cli: &Cli, config: &Config) -> RetryPolicy {
    let mut policy = config.scrape.retry_policy();
    if let Some(retries) = cli.retry_count {
        policy.retries = retries;
    }
    if let Some(delay) = cli.retry_delay {
        policy.delay = delay;
        if let Backoff::Exponential { max } = &mut policy.backoff {
            *max = (*max).max(delay);
        }
    }
    policy
}

/// 2 if any user failed on credentials, 1 for any other failure, else 0.
fn batch_exit_code(batch: &BatchReport) -> i32 {
    batch
        .failed()
        .filter_map(|r| r.error())
        .map(|e| TimesiftError::Platform(e.clone()).exit_code())
        .max()
        .unwrap_or(0)
}

/// Returns false if any export failed. Failures are reported, never fatal.
fn write_exports(cli: &Cli, records: &[PostRecord]) -> bool {
    let mut ok = true;

    if let Some(path) = &cli.json {
        match export::write_json(path, records) {
            Ok(()) => eprintln!("Saved {} posts to {}", records.len(), path.display()),
            Err(e) => {
                eprintln!("Error: {}", e);
                ok = false;
            }
        }
    }
    if let Some(path) = &cli.csv {
        match export::write_csv(path, records) {
            Ok(()) => eprintln!("Saved {} posts to {}", records.len(), path.display()),
            Err(e) => {
                eprintln!("Error: {}", e);
                ok = false;
            }
        }
    }
    ok
}

fn print_preview(records: &[PostRecord], multi_user: bool) {
    if records.is_empty() {
        println!("No posts found");
        return;
    }

    println!("Found {} posts:", records.len());
    for (index, record) in records.iter().take(PREVIEW_LIMIT).enumerate() {
        let user = match (&record.user_identifier, multi_user) {
            (Some(user), true) => format!(" @{}", user),
            _ => String::new(),
        };
        println!(
            "{:>2}. [{}]{} {}",
            index + 1,
            record.time,
            user,
            truncate(&record.text, PREVIEW_WIDTH)
        );
        println!("    id: {}", record.post_id);
    }
    if records.len() > PREVIEW_LIMIT {
        println!("... and {} more", records.len() - PREVIEW_LIMIT);
    }
}

fn truncate(text: &str, width: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > width {
        let cut: String = flat.chars().take(width).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}
