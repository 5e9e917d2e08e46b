//! press-bulk - Share many posts, optionally spaced out over time

use clap::Parser;
use libpresscast::scheduling::{format_timestamp, parse_delay};
use libpresscast::service::publish::{BulkReport, BulkRequest, BulkStatus};
use libpresscast::service::PresscastService;
use libpresscast::{Config, PlatformKind, PresscastError, Result, SourcePost};
use std::io::{self, Read};

#[derive(Parser, Debug)]
#[command(name = "press-bulk")]
#[command(version)]
#[command(about = "Share many posts, optionally staggered")]
#[command(long_about = "\
press-bulk - Share many posts, optionally staggered

DESCRIPTION:
    press-bulk shares a list of posts. Posts already shared to a target
    are skipped unless --force is given.

    Without a stagger every post is shared right away, one after another.
    With --stagger the first post is shared now and each following post is
    queued one stagger later than the previous one; press-send shares the
    queued posts when they come due.

INPUT:
    A JSON array of posts from --file or stdin, or WordPress post ids
    with --wp-ids.

USAGE EXAMPLES:
    # Share every post in a file now
    press-bulk --file backlog.json

    # One post every 30 minutes
    press-bulk --file backlog.json --stagger 30m

    # Re-share three WordPress posts to LinkedIn, an hour apart
    press-bulk --wp-ids 10,11,12 --platform linkedin --stagger 1h --force

OUTPUT:
    One line per post: <post_id>:<published|scheduled|skipped|failed>:<detail>

EXIT CODES:
    0 - No post failed
    1 - At least one post failed
    3 - Invalid input
")]
struct Cli {
    /// Read the JSON array of posts from this file (default: stdin)
    #[arg(long, value_name = "PATH", conflicts_with = "wp_ids")]
    file: Option<String>,

    /// Fetch posts from WordPress by id (comma-separated)
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    wp_ids: Vec<i64>,

    /// Target platform(s), comma-separated (default: configured targets)
    #[arg(short, long)]
    platform: Option<String>,

    /// Spacing between posts, e.g. "30m" (default: publishing.bulk_stagger)
    #[arg(long, value_name = "DURATION")]
    stagger: Option<String>,

    /// Share again even where a post was already shared
    #[arg(long)]
    force: bool,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libpresscast::logging::init_for_cli(cli.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    if cli.format != "text" && cli.format != "json" {
        return Err(PresscastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            cli.format
        )));
    }

    let platforms = match &cli.platform {
        Some(list) => PlatformKind::parse_list(list)?,
        None => Vec::new(),
    };

    let config = Config::load()?;
    let stagger = match &cli.stagger {
        Some(value) => parse_delay(value)?,
        None => config.publishing.bulk_stagger()?,
    };

    let service = PresscastService::from_config(config).await?;
    let posts = if cli.wp_ids.is_empty() {
        read_posts(cli.file.as_deref())?
    } else {
        service.wordpress()?.fetch_posts(&cli.wp_ids).await?
    };

    if posts.is_empty() {
        return Err(PresscastError::InvalidInput("No posts to share".to_string()));
    }

    let report = service
        .publish()
        .bulk_publish(BulkRequest {
            posts,
            platforms,
            stagger,
            force: cli.force,
        })
        .await?;

    if cli.format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&report)
                .map_err(|e| PresscastError::InvalidInput(e.to_string()))?
        );
    } else {
        print_report(&report);
    }

    Ok(if report.failed > 0 { 1 } else { 0 })
}

fn read_posts(file: Option<&str>) -> Result<Vec<SourcePost>> {
    let input = match file {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            PresscastError::InvalidInput(format!("Failed to read {}: {}", path, e))
        })?,
        None => {
            if atty::is(atty::Stream::Stdin) {
                return Err(PresscastError::InvalidInput(
                    "No posts provided. Pass --file, --wp-ids or pipe a JSON array to stdin"
                        .to_string(),
                ));
            }
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| PresscastError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
            buffer
        }
    };

    SourcePost::list_from_json(&input)
}

fn print_report(report: &BulkReport) {
    for item in &report.items {
        let detail = match item.status {
            BulkStatus::Published => item
                .outcomes
                .iter()
                .map(|o| format!("{}={}", o.platform, if o.success { "ok" } else { "error" }))
                .collect::<Vec<_>>()
                .join(","),
            BulkStatus::Scheduled => format!(
                "{} at {}",
                item.job_id.as_deref().unwrap_or_default(),
                item.run_at.map(format_timestamp).unwrap_or_default()
            ),
            BulkStatus::Skipped | BulkStatus::Failed => item.reason.clone().unwrap_or_default(),
        };
        let status = match item.status {
            BulkStatus::Published => "published",
            BulkStatus::Scheduled => "scheduled",
            BulkStatus::Skipped => "skipped",
            BulkStatus::Failed => "failed",
        };
        println!("{}:{}:{}", item.post_id, status, detail);
    }

    eprintln!(
        "{} published, {} scheduled, {} skipped, {} failed",
        report.published, report.scheduled, report.skipped, report.failed
    );
}
