//! press-queue - Manage queued shares and retries
//!
//! Unix-style tool for inspecting and editing the job queue that press-send
//! works through.

use clap::{Parser, Subcommand};
use libpresscast::scheduling::{format_timestamp, parse_delay, parse_schedule};
use libpresscast::service::PresscastService;
use libpresscast::{Config, Job, JobStatus, PlatformKind, PresscastError, Result, ShareOutcome};
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Jobs shown under "Upcoming" in `stats`
const UPCOMING_LIMIT: usize = 5;

#[derive(Parser, Debug)]
#[command(name = "press-queue")]
#[command(version)]
#[command(about = "Manage queued shares and retries")]
#[command(long_about = "\
press-queue - Manage queued shares and retries

DESCRIPTION:
    press-queue is a Unix-style tool for managing the Presscast job queue.
    A job is a one-shot callback: a delayed share, a staggered bulk post,
    or a single retry of a failed share. press-send runs jobs when they
    come due; press-queue lists, cancels, moves or runs them by hand.

COMMANDS:
    list        List jobs (pending by default)
    cancel      Cancel a pending job
    reschedule  Move a pending job to a different time
    now         Run a pending job immediately
    stats       Show statistics about pending jobs

USAGE EXAMPLES:
    # List pending jobs
    press-queue list

    # Every job, as JSON
    press-queue list --status all --format json

    # Cancel a job
    press-queue cancel <JOB_ID>

    # Push a job back by an hour
    press-queue reschedule <JOB_ID> +1h

    # Run a job now
    press-queue now <JOB_ID>

CONFIGURATION:
    Configuration file: ~/.config/presscast/config.toml
    Database location: ~/.local/share/presscast/presscast.db

    Override with environment variables:
        PRESSCAST_CONFIG    - Path to config file
        PRESSCAST_DB_PATH   - Path to database file

EXIT CODES:
    0 - Success
    1 - Operation failed
    3 - Invalid input (unknown job, bad time format, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List jobs
    List {
        /// Job status to show (pending, running, done, failed, cancelled, all)
        #[arg(short, long, default_value = "pending")]
        status: String,

        /// Only jobs that target this platform
        #[arg(short, long)]
        platform: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Cancel a pending job
    Cancel {
        /// Job ID to cancel
        job_id: Option<String>,

        /// Cancel every pending job
        #[arg(long, conflicts_with = "job_id")]
        all: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Move a pending job to a different time
    Reschedule {
        /// Job ID to reschedule
        job_id: String,

        /// New time ("tomorrow 3pm", "2h") or a shift of the current one ("+1h", "-30m")
        #[arg(allow_hyphen_values = true)]
        time: String,
    },

    /// Run a pending job immediately
    Now {
        /// Job ID to run
        job_id: String,
    },

    /// Show statistics about pending jobs
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
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
    let config = Config::load()?;
    let service = PresscastService::from_config(config).await?;

    match cli.command {
        Commands::List {
            status,
            platform,
            format,
        } => cmd_list(&service, &status, platform.as_deref(), &format).await?,
        Commands::Cancel { job_id, all, force } => {
            cmd_cancel(&service, job_id.as_deref(), all, force).await?
        }
        Commands::Reschedule { job_id, time } => cmd_reschedule(&service, &job_id, &time).await?,
        Commands::Now { job_id } => return cmd_now(&service, &job_id).await,
        Commands::Stats { format } => cmd_stats(&service, &format).await?,
    }

    Ok(0)
}

fn validate_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(PresscastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

/// Fetch a job that must still be pending
async fn pending_job(service: &PresscastService, job_id: &str) -> Result<Job> {
    let job = service
        .scheduler()
        .get(job_id)
        .await?
        .ok_or_else(|| PresscastError::InvalidInput(format!("Job not found: {}", job_id)))?;

    if job.status != JobStatus::Pending {
        return Err(PresscastError::InvalidInput(format!(
            "Job {} is {}, not pending",
            job_id,
            job.status.as_str()
        )));
    }
    Ok(job)
}

async fn cmd_list(
    service: &PresscastService,
    status: &str,
    platform: Option<&str>,
    format: &str,
) -> Result<()> {
    validate_format(format)?;

    let status = match status {
        "all" => None,
        other => Some(other.parse::<JobStatus>()?),
    };
    let platform = platform.map(|p| p.parse::<PlatformKind>()).transpose()?;

    let mut jobs = service.scheduler().list(status, 0).await?;
    if let Some(kind) = platform {
        jobs.retain(|job| job.platforms.contains(&kind));
    }

    if format == "json" {
        println!("{}", to_json(&jobs));
    } else {
        output_list_text(&jobs);
    }

    Ok(())
}

fn output_list_text(jobs: &[Job]) {
    let now = chrono::Utc::now().timestamp();

    for job in jobs {
        let when = if job.status == JobStatus::Pending {
            format_time_until(now, job.run_at)
        } else {
            job.status.as_str().to_string()
        };

        println!(
            "{} | {} | post {}: {} | {} | {}",
            job.id,
            job.kind.as_str(),
            job.post.id,
            truncate(&job.post.title, 40),
            join_kinds(&job.platforms),
            when
        );
    }
}

/// Truncate to `max_chars` characters with an ellipsis
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

/// Format time until the run time in human-readable form
fn format_time_until(now: i64, run_at: i64) -> String {
    let diff = run_at - now;

    if diff < 0 {
        return "overdue".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}

async fn cmd_cancel(
    service: &PresscastService,
    job_id: Option<&str>,
    all: bool,
    force: bool,
) -> Result<()> {
    let jobs = match (job_id, all) {
        (Some(id), false) => vec![pending_job(service, id).await?],
        (None, true) => service.scheduler().list(Some(JobStatus::Pending), 0).await?,
        _ => {
            return Err(PresscastError::InvalidInput(
                "Specify a job ID or --all".to_string(),
            ))
        }
    };

    if jobs.is_empty() {
        println!("No pending jobs to cancel");
        return Ok(());
    }

    if !force {
        if !atty::is(atty::Stream::Stdin) {
            return Err(PresscastError::InvalidInput(
                "Not a TTY. Use --force to cancel without confirmation".to_string(),
            ));
        }
        print!("Cancel {} job(s)? [y/N]: ", jobs.len());
        io::stdout()
            .flush()
            .map_err(|e| PresscastError::InvalidInput(e.to_string()))?;

        let mut input = String::new();
        io::stdin()
            .read_line(&mut input)
            .map_err(|e| PresscastError::InvalidInput(e.to_string()))?;
        if !matches!(input.trim(), "y" | "Y" | "yes") {
            println!("Cancelled nothing");
            return Ok(());
        }
    }

    let mut cancelled = 0;
    for job in &jobs {
        // A job may have been claimed by press-send in the meantime
        if service.scheduler().cancel(&job.id).await? {
            println!("Cancelled {}", job.id);
            cancelled += 1;
        } else {
            eprintln!("Job {} is no longer pending", job.id);
        }
    }

    if all {
        println!("Cancelled {} job(s)", cancelled);
    }
    Ok(())
}

async fn cmd_reschedule(service: &PresscastService, job_id: &str, time: &str) -> Result<()> {
    let job = pending_job(service, job_id).await?;
    let now = chrono::Utc::now().timestamp();

    let run_at = resolve_time(time, job.run_at)?;
    if run_at < now {
        return Err(PresscastError::InvalidInput(format!(
            "Cannot reschedule to the past ({})",
            format_timestamp(run_at)
        )));
    }

    if !service.scheduler().reschedule(&job.id, run_at).await? {
        return Err(PresscastError::InvalidInput(format!(
            "Job {} is no longer pending",
            job.id
        )));
    }

    println!("Rescheduled {} to {}", job.id, format_timestamp(run_at));
    Ok(())
}

/// `+1h` and `-30m` shift the current time; anything else is a new schedule
fn resolve_time(time: &str, current: i64) -> Result<i64> {
    let time = time.trim();
    if let Some(shift) = time.strip_prefix('+') {
        return Ok(current + parse_delay(shift)?.as_secs() as i64);
    }
    if let Some(shift) = time.strip_prefix('-') {
        return Ok(current - parse_delay(shift)?.as_secs() as i64);
    }
    Ok(parse_schedule(time, None)?.timestamp())
}

async fn cmd_now(service: &PresscastService, job_id: &str) -> Result<i32> {
    let job = pending_job(service, job_id).await?;
    println!(
        "Running {} for post {} on {}",
        job.id,
        job.post.id,
        join_kinds(&job.platforms)
    );

    let outcomes = service
        .publish()
        .run_job(&job.id)
        .await?
        .ok_or_else(|| PresscastError::InvalidInput(format!("Job {} is no longer pending", job.id)))?;

    if outcomes.is_empty() {
        println!("Nothing to do: post {} was already shared", job.post.id);
    }
    for outcome in &outcomes {
        print_outcome(outcome);
    }

    Ok(if outcomes.iter().all(|o| o.success) { 0 } else { 1 })
}

fn print_outcome(outcome: &ShareOutcome) {
    if outcome.success {
        let location = outcome
            .remote_url
            .as_deref()
            .or(outcome.remote_id.as_deref())
            .unwrap_or_default();
        println!("{}:ok:{}", outcome.platform, location);
    } else {
        println!(
            "{}:error:{}:{}",
            outcome.platform,
            outcome.category.map(|c| c.as_str()).unwrap_or("generic"),
            outcome.error.as_deref().unwrap_or_default()
        );
    }
}

async fn cmd_stats(service: &PresscastService, format: &str) -> Result<()> {
    validate_format(format)?;

    let jobs = service.scheduler().list(Some(JobStatus::Pending), 0).await?;
    let stats = QueueStats::from_jobs(&jobs, chrono::Utc::now().timestamp());

    if format == "json" {
        println!(
            "{}",
            to_json(&serde_json::json!({
                "total": stats.total,
                "retries": stats.retries,
                "platforms": stats.per_platform,
                "buckets": {
                    "overdue": stats.overdue,
                    "next_hour": stats.next_hour,
                    "today": stats.today,
                    "this_week": stats.this_week,
                    "later": stats.later,
                },
                "upcoming": jobs.iter().take(UPCOMING_LIMIT).collect::<Vec<_>>(),
            }))
        );
        return Ok(());
    }

    println!("Queue statistics");
    println!();
    println!("Total: {} ({} retries)", stats.total, stats.retries);
    println!();
    println!("By platform:");
    for (platform, count) in &stats.per_platform {
        println!("  {}: {}", platform, count);
    }
    println!();
    println!("By time:");
    println!("  Overdue: {}", stats.overdue);
    println!("  Next hour: {}", stats.next_hour);
    println!("  Today: {}", stats.today);
    println!("  This week: {}", stats.this_week);
    println!("  Later: {}", stats.later);

    if !jobs.is_empty() {
        println!();
        println!("Upcoming:");
        for job in jobs.iter().take(UPCOMING_LIMIT) {
            println!(
                "  {} | post {}: {} | {}",
                format_timestamp(job.run_at),
                job.post.id,
                truncate(&job.post.title, 40),
                join_kinds(&job.platforms)
            );
        }
    }

    Ok(())
}

#[derive(Debug, Default, PartialEq)]
struct QueueStats {
    total: usize,
    retries: usize,
    per_platform: BTreeMap<&'static str, usize>,
    overdue: usize,
    next_hour: usize,
    today: usize,
    this_week: usize,
    later: usize,
}

impl QueueStats {
    fn from_jobs(jobs: &[Job], now: i64) -> Self {
        let mut stats = QueueStats {
            total: jobs.len(),
            ..Default::default()
        };

        for job in jobs {
            if job.kind == libpresscast::JobKind::Retry {
                stats.retries += 1;
            }
            for kind in &job.platforms {
                *stats.per_platform.entry(kind.as_str()).or_default() += 1;
            }

            let diff = job.run_at - now;
            match diff {
                d if d < 0 => stats.overdue += 1,
                d if d < 3600 => stats.next_hour += 1,
                d if d < 86_400 => stats.today += 1,
                d if d < 7 * 86_400 => stats.this_week += 1,
                _ => stats.later += 1,
            }
        }

        stats
    }
}

fn join_kinds(kinds: &[PlatformKind]) -> String {
    kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(",")
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}
