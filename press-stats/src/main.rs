use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libpresscast::analytics::{Analytics, PlatformSummary};
use libpresscast::db::ShareQuery;
use libpresscast::{Config, Database, PlatformKind, ShareRecord};

#[derive(Parser, Debug)]
#[command(name = "press-stats")]
#[command(version, about = "Share history and engagement statistics")]
#[command(long_about = r#"Share history and engagement statistics from the local share log.

EXAMPLES:
    # Totals and engagement per platform
    press-stats summary

    # Only the last week
    press-stats summary --since 7d

    # Last 20 share attempts (default)
    press-stats recent

    # Failed LinkedIn shares
    press-stats recent --platform linkedin --failures

    # Every attempt for one post
    press-stats recent --post 42 --limit 0

    # Export for a spreadsheet
    press-stats recent --limit 0 --format csv > shares.csv

    # Scripting
    press-stats summary --format json | jq '.[] | select(.platform == "all")'

OUTPUT FORMATS:
    text  - Human-readable (default)
    json  - JSON array
    csv   - CSV with headers

EXIT CODES:
    0 - Success (including empty results)
    1 - Error (database not found, query failed, etc.)
"#)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output format
    #[arg(short, long, default_value = "text", global = true, value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json", "csv"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Per-platform totals, success rate and engagement
    Summary {
        /// Only count shares since this date (Unix timestamp, YYYY-MM-DD, ISO 8601, or an age like "7d")
        #[arg(long, value_name = "DATE")]
        since: Option<String>,
    },

    /// Most recent share attempts, newest first
    Recent {
        /// Filter by platform (x, linkedin, bluesky, facebook)
        #[arg(short, long, value_name = "PLATFORM")]
        platform: Option<String>,

        /// Only attempts for this post
        #[arg(long, value_name = "ID")]
        post: Option<i64>,

        /// Only failed attempts
        #[arg(long)]
        failures: bool,

        /// Maximum number of attempts to return (0 for all)
        #[arg(short, long, default_value = "20", value_name = "N")]
        limit: usize,
    },
}

/// Parse a date to a Unix timestamp
fn parse_date(date_str: &str, now: i64) -> Result<i64> {
    if let Ok(timestamp) = date_str.parse::<i64>() {
        return Ok(timestamp);
    }

    if let Ok(age) = humantime::parse_duration(date_str) {
        return Ok(now - age.as_secs() as i64);
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(date_str) {
        return Ok(dt.timestamp());
    }

    let date = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d").with_context(|| {
        format!(
            "Invalid date format: {}. Use a Unix timestamp, YYYY-MM-DD, ISO 8601 or an age like 7d",
            date_str
        )
    })?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .context("Invalid date")?
        .and_utc();
    Ok(midnight.timestamp())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    libpresscast::logging::init_for_cli(args.verbose);
    tracing::debug!("press-stats started with args: {:?}", args);

    let config = Config::load().context("Failed to load configuration")?;

    let db_path = shellexpand::tilde(&config.database.path).to_string();
    if !std::path::Path::new(&db_path).exists() {
        eprintln!("Error: Database not found at {}", db_path);
        eprintln!("Have you shared anything yet? Try: press-share --file post.json");
        std::process::exit(1);
    }

    let analytics = Analytics::new(
        Database::new(&db_path)
            .await
            .context("Failed to open database")?,
    );

    match args.command {
        Command::Summary { since } => {
            let since = since
                .as_deref()
                .map(|s| parse_date(s, chrono::Utc::now().timestamp()))
                .transpose()?;
            let mut rows = analytics
                .summary(since)
                .await
                .context("Failed to summarize share log")?;
            if !rows.is_empty() {
                rows.push(PlatformSummary::combine(&rows));
            }
            print_summary(&rows, &args.format)?;
        }
        Command::Recent {
            platform,
            post,
            failures,
            limit,
        } => {
            let platform = platform
                .as_deref()
                .map(|p| p.parse::<PlatformKind>())
                .transpose()?;
            let query = ShareQuery {
                platform: platform.map(|p| p.as_str().to_string()),
                post_id: post,
                since: None,
                only_failures: failures,
                limit,
            };
            let records = analytics
                .query(&query)
                .await
                .context("Failed to query share log")?;
            print_records(&records, &args.format)?;
        }
    }

    Ok(())
}

fn print_summary(rows: &[PlatformSummary], format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(rows)?),
        "csv" => {
            println!("platform,total,succeeded,failed,success_rate,likes,shares,comments,impressions");
            for row in rows {
                println!(
                    "{},{},{},{},{:.3},{},{},{},{}",
                    row.platform,
                    row.total,
                    row.succeeded,
                    row.failed,
                    row.success_rate,
                    row.likes,
                    row.shares,
                    row.comments,
                    row.impressions
                );
            }
        }
        _ => {
            if rows.is_empty() {
                println!("No shares recorded yet");
                return Ok(());
            }

            println!(
                "{:<10} {:>6} {:>6} {:>6} {:>7} {:>8} {:>8} {:>9} {:>12}",
                "PLATFORM", "TOTAL", "OK", "FAILED", "RATE", "LIKES", "SHARES", "COMMENTS", "IMPRESSIONS"
            );
            for row in rows {
                println!(
                    "{:<10} {:>6} {:>6} {:>6} {:>6.1}% {:>8} {:>8} {:>9} {:>12}",
                    row.platform,
                    row.total,
                    row.succeeded,
                    row.failed,
                    row.success_rate * 100.0,
                    row.likes,
                    row.shares,
                    row.comments,
                    row.impressions
                );
            }
        }
    }
    Ok(())
}

fn print_records(records: &[ShareRecord], format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(records)?),
        "csv" => {
            println!("id,post_id,shared_at,platform,success,attempt,remote_url,error_category,likes,shares,comments,impressions,title");
            for r in records {
                println!(
                    "{},{},{},{},{},{},{},{},{},{},{},{},{}",
                    r.id,
                    r.post_id,
                    r.shared_at,
                    r.platform,
                    r.success,
                    r.attempt,
                    r.remote_url.as_deref().unwrap_or(""),
                    r.error_category.as_deref().unwrap_or(""),
                    r.likes,
                    r.shares,
                    r.comments,
                    r.impressions,
                    csv_field(&r.post_title)
                );
            }
        }
        _ => {
            for r in records {
                let when = chrono::DateTime::from_timestamp(r.shared_at, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| r.shared_at.to_string());

                println!("{} | post {} | {}", when, r.post_id, r.post_title);
                if r.success {
                    println!(
                        "  ✓ {}: {}",
                        r.platform,
                        r.remote_url.as_deref().or(r.remote_id.as_deref()).unwrap_or("")
                    );
                    if r.metrics_updated_at.is_some() {
                        println!(
                            "    {} likes, {} shares, {} comments, {} impressions",
                            r.likes, r.shares, r.comments, r.impressions
                        );
                    }
                } else {
                    println!(
                        "  ✗ {} ({}, attempt {}): {}",
                        r.platform,
                        r.error_category.as_deref().unwrap_or("generic"),
                        r.attempt,
                        r.error_message.as_deref().unwrap_or("")
                    );
                }
            }
        }
    }
    Ok(())
}

/// Quote a CSV field
fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
