//! press-send - Background daemon for queued shares and retries
//!
//! Runs due jobs from the queue (delayed shares, staggered bulk posts and
//! one-shot retries), keeps LinkedIn tokens fresh and refreshes engagement
//! metrics of past shares.

use clap::Parser;
use libpresscast::analytics::SimulatedEngagement;
use libpresscast::oauth::OAuthHandler;
use libpresscast::rate_limiter::RateLimiter;
use libpresscast::service::PresscastService;
use libpresscast::{Config, PlatformKind, PresscastError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

/// Rate limit windows older than this are pruned
const RATE_WINDOW_RETENTION_SECS: i64 = 24 * 3600;
/// A job claimed longer ago than this is assumed abandoned by a dead worker
const STALE_CLAIM_SECS: i64 = 3600;

#[derive(Parser, Debug)]
#[command(name = "press-send")]
#[command(version)]
#[command(about = "Background daemon for queued shares and retries")]
#[command(long_about = "\
press-send - Background daemon for queued shares and retries

DESCRIPTION:
    press-send is a long-running daemon that works through the Presscast
    job queue. Each job is a one-shot callback: a delayed share from the
    publish hook, a staggered post from press-bulk, or a single retry of
    a failed share. A job runs once; a retry that fails again may queue
    one more retry until retry.max_attempts is reached.

    Between polls it refreshes LinkedIn tokens that are about to expire
    and updates the engagement metrics of past shares.

USAGE:
    # Run in foreground (logs to stderr)
    press-send

    # Poll every 10 seconds
    press-send --poll-interval 10

    # Process due jobs once and exit (cron)
    press-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current job)

CONFIGURATION:
    [daemon]
    poll_interval = 60   # seconds between queue polls
    batch_size = 20      # jobs claimed per poll

    [analytics]
    enabled = true
    poll_interval = \"1h\"
    stale_after = \"6h\"

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
")]
struct Cli {
    /// Poll interval in seconds (overrides daemon.poll_interval)
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Process due jobs once and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut logging = libpresscast::logging::LoggingConfig::from_env(cli.verbose);
    if std::env::var("PRESSCAST_LOG_LEVEL").is_err() {
        logging.level = "info".to_string();
    }
    logging.init();

    if let Err(e) = run(cli).await {
        error!("press-send failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let daemon = Daemon::new(config).await?;

    info!("press-send daemon starting");

    if cli.once {
        let poll_analytics = daemon.analytics_interval.is_some();
        daemon.tick(chrono::Utc::now().timestamp(), poll_analytics).await;
        info!("press-send: processed due jobs once, exiting");
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let poll_interval = cli
        .poll_interval
        .unwrap_or(daemon.service.config().daemon.poll_interval)
        .max(1);
    info!("Poll interval: {}s", poll_interval);

    daemon.run_loop(poll_interval, shutdown).await;

    info!("press-send daemon stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| PresscastError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("Received shutdown signal, stopping gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

struct Daemon {
    service: PresscastService,
    oauth: OAuthHandler,
    limiter: RateLimiter,
    analytics_interval: Option<Duration>,
    stale_after: Duration,
}

impl Daemon {
    async fn new(config: Config) -> Result<Self> {
        let analytics_interval = if config.analytics.enabled {
            Some(config.analytics.poll_interval()?)
        } else {
            None
        };
        let stale_after = config.analytics.stale_after()?;
        let limiter = RateLimiter::from_config(&config);

        let service = PresscastService::from_config(config).await?;
        let oauth = OAuthHandler::new(service.config().clone(), Arc::clone(service.credentials()))?;

        Ok(Self {
            service,
            oauth,
            limiter,
            analytics_interval,
            stale_after,
        })
    }

    async fn run_loop(&self, poll_interval: u64, shutdown: Arc<AtomicBool>) {
        let mut last_analytics: Option<i64> = None;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, stopping daemon loop");
                break;
            }

            let now = chrono::Utc::now().timestamp();
            let analytics_due = match (self.analytics_interval, last_analytics) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(every), Some(last)) => now - last >= every.as_secs() as i64,
            };
            if analytics_due {
                last_analytics = Some(now);
            }

            self.tick(now, analytics_due).await;

            // Sleep until next poll (check shutdown every second)
            for _ in 0..poll_interval {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                sleep(Duration::from_secs(1)).await;
            }
        }
    }

    /// One pass: refresh tokens, run due jobs, then housekeeping
    ///
    /// Errors are logged, never fatal: the next poll tries again.
    async fn tick(&self, now: i64, poll_analytics: bool) {
        if self.service.config().is_enabled(PlatformKind::LinkedIn) {
            match self.oauth.ensure_fresh(PlatformKind::LinkedIn, now).await {
                Ok(true) => info!("Refreshed LinkedIn access token"),
                Ok(false) => {}
                Err(e) => warn!("LinkedIn token refresh failed: {}", e),
            }
        }

        if let Err(e) = self
            .service
            .scheduler()
            .requeue_stale(now - STALE_CLAIM_SECS)
            .await
        {
            warn!("Could not requeue stale jobs: {}", e);
        }

        match self.service.publish().run_due_jobs(now).await {
            Ok(report) if report.claimed > 0 => {
                let succeeded = report.outcomes.iter().filter(|o| o.success).count();
                info!(
                    "Ran {} job(s): {} share(s) succeeded, {} failed, {} failed job(s)",
                    report.claimed,
                    succeeded,
                    report.outcomes.len() - succeeded,
                    report.failed
                );
            }
            Ok(_) => debug!("No jobs due"),
            Err(e) => error!("Error processing jobs: {}", e),
        }

        if poll_analytics {
            if let Err(e) = self
                .service
                .analytics()
                .poll_engagement(&SimulatedEngagement, now, self.stale_after)
                .await
            {
                error!("Engagement poll failed: {}", e);
            }
        }

        match self
            .limiter
            .cleanup_old_windows(self.service.database(), now - RATE_WINDOW_RETENTION_SECS)
            .await
        {
            Ok(0) => {}
            Ok(removed) => debug!("Pruned {} rate limit window(s)", removed),
            Err(e) => warn!("Rate limit cleanup failed: {}", e),
        }
    }
}
