//! press-share - Share a blog post to social networks
//!
//! Reads one post (JSON from a file or stdin, or fetched from WordPress by id)
//! and shares it now, schedules it, previews it, or runs it through the
//! publish-transition hook.

use clap::Parser;
use libpresscast::formatter::{self, Formatter};
use libpresscast::scheduling::{format_timestamp, parse_schedule};
use libpresscast::service::publish::{PostTransition, ShareReport, TransitionDecision};
use libpresscast::service::PresscastService;
use libpresscast::{Config, ErrorCategory, PlatformKind, PresscastError, Result, ShareOutcome, SourcePost};
use std::io::{self, Read};

#[derive(Parser, Debug)]
#[command(name = "press-share")]
#[command(version)]
#[command(about = "Share a blog post to social networks")]
#[command(long_about = "\
press-share - Share a blog post to social networks

DESCRIPTION:
    press-share takes one post and shares it to the enabled networks
    (X, LinkedIn, Bluesky, Facebook). Each network gets its own text,
    built from the configured template and shortened to fit its limit.

    Failures are classified. Network and rate limit failures are queued
    for a retry that press-send runs later, up to retry.max_attempts
    attempts in total. Rejected credentials are reported for press-creds.
    Rejected content is given up.

INPUT:
    The post is JSON, read from --file or stdin:

        {\"id\": 42, \"title\": \"Hello\", \"url\": \"https://blog.example/hello\",
         \"excerpt\": \"...\", \"tags\": [\"rust\"]}

    Or fetched from WordPress with --wp-id (needs [wordpress] site_url).

USAGE EXAMPLES:
    # Share to every enabled network
    press-share --file post.json

    # Share to specific networks
    press-share --wp-id 42 --platform x,bluesky

    # Preview the text each network would get
    press-share --file post.json --dry-run

    # Schedule for later
    press-share --file post.json --at \"2h\"

    # Publish hook: react to a draft -> publish transition
    press-share --wp-id 42 --transition draft

EXIT CODES:
    0 - Shared to every target (or nothing to do)
    1 - At least one target failed
    2 - Credentials missing or rejected
    3 - Invalid input
")]
struct Cli {
    /// Read the post JSON from this file (default: stdin)
    #[arg(long, value_name = "PATH", conflicts_with = "wp_id")]
    file: Option<String>,

    /// Fetch the post from WordPress by id
    #[arg(long, value_name = "ID")]
    wp_id: Option<i64>,

    /// Target platform(s), comma-separated (default: configured targets)
    #[arg(short, long)]
    platform: Option<String>,

    /// Treat the post as transitioning from this status to its current one
    #[arg(long, value_name = "OLD_STATUS", conflicts_with_all = ["at", "force", "platform"])]
    transition: Option<String>,

    /// Schedule the share instead of sharing now (e.g. "30m", "tomorrow 9am")
    #[arg(long, value_name = "TIME")]
    at: Option<String>,

    /// Share again even where the post was already shared
    #[arg(long)]
    force: bool,

    /// Print the formatted text per platform without sharing
    #[arg(long)]
    dry_run: bool,

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
    let json = cli.format == "json";

    let platforms = match &cli.platform {
        Some(list) => PlatformKind::parse_list(list)?,
        None => Vec::new(),
    };

    let config = Config::load()?;

    if cli.dry_run && cli.wp_id.is_none() {
        let post = read_post(cli.file.as_deref())?;
        return dry_run(&config, &post, &platforms, json);
    }

    let service = PresscastService::from_config(config).await?;
    let post = match cli.wp_id {
        Some(id) => service.wordpress()?.fetch_post(id).await?,
        None => read_post(cli.file.as_deref())?,
    };

    if cli.dry_run {
        return dry_run(service.config(), &post, &platforms, json);
    }

    if let Some(old_status) = cli.transition {
        let transition = PostTransition {
            new_status: post.status.clone(),
            old_status,
            post,
        };
        let decision = service.publish().handle_transition(&transition).await?;
        return Ok(print_decision(&decision, json));
    }

    if let Some(at) = &cli.at {
        let run_at = parse_schedule(at, None)?.timestamp();
        let job = service
            .publish()
            .schedule(&post, &platforms, run_at, cli.force)
            .await?;
        match job {
            Some(job) if json => {
                println!("{}", to_json(&job));
            }
            Some(job) => {
                println!(
                    "scheduled:{}:{}:{}",
                    job.id,
                    format_timestamp(job.run_at),
                    join_kinds(&job.platforms)
                );
            }
            None => eprintln!("Post {} already has a pending share for those platforms", post.id),
        }
        return Ok(0);
    }

    let report = service.publish().share_now(&post, &platforms, cli.force).await?;
    Ok(print_report(&report, json))
}

/// Load the post from a file, or from stdin when no file is given
fn read_post(file: Option<&str>) -> Result<SourcePost> {
    let input = match file {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            PresscastError::InvalidInput(format!("Failed to read {}: {}", path, e))
        })?,
        None => {
            if atty::is(atty::Stream::Stdin) {
                return Err(PresscastError::InvalidInput(
                    "No post provided. Pass --file, --wp-id or pipe JSON to stdin".to_string(),
                ));
            }
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| PresscastError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
            buffer
        }
    };

    SourcePost::from_json(&input)
}

fn dry_run(config: &Config, post: &SourcePost, platforms: &[PlatformKind], json: bool) -> Result<i32> {
    let targets = if platforms.is_empty() {
        config.default_targets()
    } else {
        platforms.to_vec()
    };
    if targets.is_empty() {
        return Err(PresscastError::InvalidInput(
            "No platforms enabled. Add a [x], [linkedin], [bluesky] or [facebook] section to the config".to_string(),
        ));
    }

    let previews = Formatter::from_config(config).preview(post, &targets);
    let mut code = 0;

    if json {
        let items: Vec<serde_json::Value> = previews
            .iter()
            .map(|(kind, result)| match result {
                Ok(formatted) => serde_json::json!({
                    "platform": kind,
                    "text": formatted.text,
                    "length": formatter::measure(*kind, &formatted.text),
                    "link": formatted.link,
                }),
                Err(e) => serde_json::json!({ "platform": kind, "error": e.to_string() }),
            })
            .collect();
        println!("{}", to_json(&items));
    }

    for (kind, result) in &previews {
        match result {
            Ok(formatted) if !json => {
                let length = formatter::measure(*kind, &formatted.text);
                println!("--- {} ({}/{}) ---", kind.display_name(), length, formatter::character_limit(*kind));
                println!("{}", formatted.text);
            }
            Ok(_) => {}
            Err(e) => {
                if !json {
                    eprintln!("{}: {}", kind, e);
                }
                code = 3;
            }
        }
    }

    Ok(code)
}

fn print_decision(decision: &TransitionDecision, json: bool) -> i32 {
    if json {
        println!("{}", to_json(decision));
    }

    match decision {
        TransitionDecision::Ignored { reason } => {
            if !json {
                println!("ignored: {}", reason);
            }
            0
        }
        TransitionDecision::Scheduled {
            job_id,
            run_at,
            platforms,
        } => {
            if !json {
                println!(
                    "scheduled:{}:{}:{}",
                    job_id,
                    format_timestamp(*run_at),
                    join_kinds(platforms)
                );
            }
            0
        }
        TransitionDecision::Published { outcomes } => {
            if !json {
                print_outcomes(outcomes);
            }
            exit_code_for(outcomes)
        }
    }
}

fn print_report(report: &ShareReport, json: bool) -> i32 {
    if json {
        println!("{}", to_json(report));
    } else {
        for kind in &report.skipped {
            println!("{}:skipped:already shared", kind);
        }
        print_outcomes(&report.outcomes);
    }
    exit_code_for(&report.outcomes)
}

/// One line per platform: `platform:ok:url` or `platform:error:category:message`
fn print_outcomes(outcomes: &[ShareOutcome]) {
    for outcome in outcomes {
        if outcome.success {
            let location = outcome
                .remote_url
                .as_deref()
                .or(outcome.remote_id.as_deref())
                .unwrap_or_default();
            println!("{}:ok:{}", outcome.platform, location);
        } else {
            let category = outcome.category.map(|c| c.as_str()).unwrap_or("generic");
            println!(
                "{}:error:{}:{}",
                outcome.platform,
                category,
                outcome.error.as_deref().unwrap_or_default()
            );
            if let Some(delay) = outcome.recovery.as_ref().and_then(|r| r.delay()) {
                eprintln!(
                    "{}: retry scheduled in {}",
                    outcome.platform,
                    humantime::format_duration(delay)
                );
            }
        }
    }
}

fn exit_code_for(outcomes: &[ShareOutcome]) -> i32 {
    let failed: Vec<&ShareOutcome> = outcomes.iter().filter(|o| !o.success).collect();
    if failed.is_empty() {
        0
    } else if failed.iter().any(|o| o.category == Some(ErrorCategory::Auth)) {
        2
    } else {
        1
    }
}

fn join_kinds(kinds: &[PlatformKind]) -> String {
    kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(",")
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}
