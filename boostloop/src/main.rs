//! boostloop - Unattended follow-back and repost daemon for Bluesky
//!
//! Follows back new followers, reposts a small selection of recent timeline
//! posts and periodically unfollows accounts that do not follow back.

use clap::Parser;
use libboostloop::logging::{LogFormat, LoggingConfig};
use libboostloop::{BoostError, Config, Credentials, Result, Runner};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "boostloop")]
#[command(version)]
#[command(about = "Unattended follow-back and repost daemon for Bluesky")]
#[command(long_about = "\
boostloop - Unattended follow-back and repost daemon for Bluesky

DESCRIPTION:
    boostloop logs in to a Bluesky account and runs a cycle on a fixed
    interval. Each cycle follows back new followers and reposts root-level
    timeline posts that are in an accepted language, within the age window
    and moderately liked. Every few cycles it unfollows accounts that do not
    follow back.

    Followed and reposted ids are kept on disk so nothing is repeated
    across restarts.

USAGE:
    # Run in foreground (logs to stderr)
    BSKY_IDENTIFIER=me.bsky.social BSKY_PASSWORD=app-password boostloop

    # Shorter interval, JSON logs
    boostloop --interval 1m --log-format json

ENVIRONMENT:
    BSKY_IDENTIFIER       Account handle or DID (required)
    BSKY_PASSWORD         Account or app password (required)
    BOOSTLOOP_CONFIG      Config file path
    BOOSTLOOP_LOG_FORMAT  text, json or pretty
    BOOSTLOOP_LOG_LEVEL   Default log level

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current cycle)

CONFIGURATION:
    Configuration file: ~/.config/boostloop/config.toml
    State directory: ~/.local/share/boostloop

    [schedule]
    interval = \"30s\"         # delay between cycles
    reconcile_every = 5      # unfollow pass every Nth cycle
    error_policy = \"isolate\" # or \"fail-fast\"
    max_errors = 10

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error or too many failed cycles
    2 - Configuration or authentication error
    3 - Invalid input
")]
struct Cli {
    /// Config file (overrides BOOSTLOOP_CONFIG)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory for following.json and reposted.json
    #[arg(long, value_name = "DIR")]
    store_dir: Option<String>,

    /// Delay between cycles, e.g. "30s" or "2m" (overrides config)
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log output format: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Run a single cycle and exit (for testing)
    #[arg(long, hide = true)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env(cli.verbose);
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    logging.init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = cli.store_dir {
        config.store.dir = Some(dir);
    }
    if let Some(interval) = cli.interval {
        config.schedule.interval = interval;
    }

    let credentials = Credentials::from_env()?;
    info!("boostloop starting as {}", credentials.identifier);
    info!(
        "Interval: {}, unfollow every {} cycle(s)",
        humantime::format_duration(config.schedule.interval),
        config.schedule.reconcile_every
    );

    let mut runner = Runner::from_config(config, credentials)?;
    runner.start().await?;

    if cli.once {
        let report = runner.run_cycle().await?;
        info!(
            "Cycle done: {} followed, {} reposted",
            report.follow_back.followed.len(),
            report.check_posts.reposted.len()
        );
        return Ok(());
    }

    // Set up graceful shutdown
    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    runner.run(shutdown).await?;
    info!("boostloop stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| BoostError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("Received shutdown signal, stopping after the current cycle");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}
