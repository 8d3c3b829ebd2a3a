//! # DeskWatch: Help Desk Ticket Watchdog
//!
//! Runs one evaluation pass over a FreeScout help desk and posts Slack
//! alerts for tickets that have waited too long. Meant to be run from cron
//! or a systemd timer every few minutes.
//!
//! Usage:
//!   deskwatch                          # One pass with ~/.deskwatch/config.toml
//!   deskwatch --dry-run --stats        # Decide and record, but never post
//!   deskwatch --check-connections      # Ping FreeScout, post a Slack test message
//!   deskwatch --init-db                # Create the local schema and exit
//!   deskwatch --cleanup                # Apply retention (and VACUUM if enabled)
//!   deskwatch --stats-only             # Print notification history stats

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use deskwatch_core::config::{self, DeskWatchConfig};
use deskwatch_core::traits::TicketSource;
use deskwatch_core::types::{NotificationStats, RunStats};
use deskwatch_db::FreeScoutSource;
use deskwatch_scheduler::{BusinessHours, NotificationDb, Notifier, NotifierSettings, SlackClient};
use tracing::instrument::WithSubscriber;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "deskwatch",
    version,
    about = "🛎️ DeskWatch: Slack alerts for help desk tickets waiting too long"
)]
struct Cli {
    /// Config file (default: ~/.deskwatch/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local notification database
    #[arg(long)]
    db_path: Option<String>,

    /// FreeScout MySQL DSN (user:pass@tcp(host:port)/db or mysql://...)
    #[arg(long)]
    freescout_dsn: Option<String>,

    /// FreeScout base URL, used for ticket links
    #[arg(long)]
    freescout_url: Option<String>,

    /// Slack incoming webhook URL
    #[arg(long)]
    slack_webhook: Option<String>,

    /// Alert on open tickets after this long without an agent reply
    #[arg(long, value_parser = duration_arg)]
    open_threshold: Option<Duration>,

    /// Alert on pending tickets after this long without a customer reply
    #[arg(long, value_parser = duration_arg)]
    pending_threshold: Option<Duration>,

    /// Minimum time between alerts for the same ticket
    #[arg(long, value_parser = duration_arg)]
    cooldown: Option<Duration>,

    /// Cap on queued notifications flushed per pass
    #[arg(long)]
    max_notifications: Option<usize>,

    /// Ignore business hours and alert around the clock
    #[arg(long)]
    disable_business_hours: bool,

    /// Business day start hour (0-23)
    #[arg(long)]
    business_hours_start: Option<u32>,

    /// Business day end hour (0-23, exclusive)
    #[arg(long)]
    business_hours_end: Option<u32>,

    /// IANA timezone for business hours
    #[arg(long)]
    timezone: Option<String>,

    /// Work days, e.g. "1,2,3,4,5" (1=Mon .. 7=Sun)
    #[arg(long)]
    work_days: Option<String>,

    /// JSON holiday list: {"holidays": ["YYYY-MM-DD", ...]}
    #[arg(long)]
    holidays_file: Option<String>,

    /// Days of notification history to keep
    #[arg(long)]
    retention_days: Option<i64>,

    /// VACUUM after --cleanup
    #[arg(long)]
    auto_vacuum: bool,

    /// Decide and record, but never post to Slack
    #[arg(long)]
    dry_run: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log format: text or json
    #[arg(long)]
    log_format: Option<String>,

    /// Print run statistics after the pass
    #[arg(long)]
    stats: bool,

    /// Test FreeScout and Slack connectivity and exit
    #[arg(long)]
    check_connections: bool,

    /// Create the local database schema and exit
    #[arg(long)]
    init_db: bool,

    /// Delete history older than the retention period and exit
    #[arg(long)]
    cleanup: bool,

    /// Print notification history statistics and exit
    #[arg(long)]
    stats_only: bool,
}

fn duration_arg(s: &str) -> std::result::Result<Duration, String> {
    config::parse_duration(s).map_err(|e| e.to_string())
}

/// Command-line values win over the config file.
fn apply_overrides(cli: &Cli, cfg: &mut DeskWatchConfig) -> Result<()> {
    if let Some(v) = &cli.db_path {
        cfg.db_path = v.clone();
    }
    if let Some(v) = &cli.freescout_dsn {
        cfg.freescout.dsn = v.clone();
    }
    if let Some(v) = &cli.freescout_url {
        cfg.freescout.url = v.clone();
    }
    if let Some(v) = &cli.slack_webhook {
        cfg.slack.webhook_url = v.clone();
    }
    if let Some(v) = cli.open_threshold {
        cfg.rules.open_threshold = v;
    }
    if let Some(v) = cli.pending_threshold {
        cfg.rules.pending_threshold = v;
    }
    if let Some(v) = cli.cooldown {
        cfg.rules.cooldown_period = v;
    }
    if let Some(v) = cli.max_notifications {
        cfg.rules.max_notifications_per_run = v;
    }
    if cli.disable_business_hours {
        cfg.business_hours.enabled = false;
    }
    if let Some(v) = cli.business_hours_start {
        cfg.business_hours.start_hour = v;
    }
    if let Some(v) = cli.business_hours_end {
        cfg.business_hours.end_hour = v;
    }
    if let Some(v) = &cli.timezone {
        cfg.business_hours.timezone = v.clone();
    }
    if let Some(v) = &cli.work_days {
        cfg.business_hours.work_days = config::parse_work_days(v)?;
    }
    if let Some(v) = &cli.holidays_file {
        cfg.business_hours.holidays_file = v.clone();
    }
    if let Some(v) = cli.retention_days {
        cfg.retention_days = v;
    }
    if let Some(v) = &cli.log_format {
        cfg.log_format = v.clone();
    }
    cfg.auto_vacuum |= cli.auto_vacuum;
    cfg.dry_run |= cli.dry_run;
    cfg.verbose |= cli.verbose;
    cfg.stats |= cli.stats;
    Ok(())
}

/// Subscriber for this process, installed per-future rather than globally.
fn build_dispatch(cfg: &DeskWatchConfig) -> tracing::Dispatch {
    let level = if cfg.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    if cfg.log_format == "json" {
        tracing::Dispatch::new(builder.json().finish())
    } else {
        tracing::Dispatch::new(builder.finish())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => DeskWatchConfig::load_from(path)?,
        None => DeskWatchConfig::load()?,
    };
    apply_overrides(&cli, &mut cfg)?;

    let dispatch = build_dispatch(&cfg);
    let result = run(&cli, &cfg).with_subscriber(dispatch.clone()).await;
    if let Err(e) = &result {
        tracing::dispatcher::with_default(&dispatch, || tracing::error!("❌ {e:#}"));
    }
    result
}

async fn run(cli: &Cli, cfg: &DeskWatchConfig) -> Result<()> {
    if cli.init_db {
        let path = cfg.expanded_db_path();
        NotificationDb::open(&path, tracing::info_span!("store"))?;
        println!("✅ Database initialized at {}", path.display());
        return Ok(());
    }

    if cli.stats_only {
        let db = NotificationDb::open(&cfg.expanded_db_path(), tracing::info_span!("store"))?;
        print_notification_stats(&db.stats(Utc::now())?);
        return Ok(());
    }

    if cli.cleanup {
        let db = NotificationDb::open(&cfg.expanded_db_path(), tracing::info_span!("store"))?;
        let report = db.cleanup_older_than(cfg.retention_days, Utc::now())?;
        println!(
            "🧹 Removed {} notification(s) and {} log entr(ies)",
            report.notifications_deleted, report.log_entries_deleted
        );
        if cfg.auto_vacuum {
            db.vacuum()?;
            println!("✅ Database vacuumed");
        }
        return Ok(());
    }

    if cli.check_connections {
        return check_connections(cfg).await;
    }

    cfg.validate(!cfg.dry_run)?;
    let stats = run_pass(cfg).await?;
    if cfg.stats || cfg.verbose {
        print_run_stats(&stats);
    }
    Ok(())
}

async fn run_pass(cfg: &DeskWatchConfig) -> Result<RunStats> {
    let db = Arc::new(NotificationDb::open(&cfg.expanded_db_path(), tracing::info_span!("store"))?);
    let source = FreeScoutSource::connect(&cfg.freescout, tracing::info_span!("freescout"))
        .await
        .context("connecting to FreeScout")?;
    let slack = SlackClient::new(&cfg.slack, tracing::info_span!("slack"))?;
    let hours = BusinessHours::new(&cfg.business_hours, &tracing::info_span!("business_hours"));

    let notifier = Notifier::new(
        Arc::new(source.clone()),
        Arc::new(slack),
        db,
        hours,
        NotifierSettings::from_config(cfg),
        tracing::info_span!("notifier"),
    );

    let result = notifier.run().await;
    source.close().await;
    Ok(result?)
}

async fn check_connections(cfg: &DeskWatchConfig) -> Result<()> {
    cfg.validate(false)?;

    println!("🔌 Checking FreeScout database...");
    let source = FreeScoutSource::connect(&cfg.freescout, tracing::info_span!("freescout"))
        .await
        .context("FreeScout connection failed")?;
    source.ping().await?;
    source.close().await;
    println!("✅ FreeScout database connection successful");

    if cfg.slack.webhook_url.trim().is_empty() {
        println!("⏭️  Slack webhook not configured, skipping");
    } else {
        println!("🔌 Checking Slack webhook...");
        SlackClient::new(&cfg.slack, tracing::info_span!("slack"))?
            .send_test_message()
            .await
            .context("Slack webhook test failed")?;
        println!("✅ Slack webhook test successful");
    }
    Ok(())
}

fn print_run_stats(stats: &RunStats) {
    println!("\n📈 Run statistics");
    println!("   Tickets checked:      {}", stats.tickets_checked);
    println!("   Notifications sent:   {}", stats.notifications_sent);
    println!("   Notifications queued: {}", stats.notifications_queued);
    println!("   Errors:               {}", stats.errors);
    println!("   Duration:             {:.2?}", stats.duration);
}

fn print_notification_stats(stats: &NotificationStats) {
    println!("📊 Notification statistics\n");
    println!("   Total notifications: {}", stats.total_notifications);

    println!("   By status:");
    for (status, n) in &stats.by_status {
        println!("     {status:<30} {n}");
    }
    println!("   By type:");
    for (kind, n) in &stats.by_type {
        println!("     {kind:<30} {n}");
    }

    println!("   Sent in last 24h:    {}", stats.sent_last_24h);
    println!("   Current queue size:  {}", stats.current_queue_size);
    println!(
        "   Bursts (7 days):     {} event(s), {} notification(s)",
        stats.burst_events_7d, stats.burst_notifications_7d
    );

    let rt = &stats.response_times_7d;
    match (rt.average_minutes, rt.minimum_minutes, rt.maximum_minutes) {
        (Some(avg), Some(min), Some(max)) => println!(
            "   Wait at alert (7d):  avg {avg:.1} min, min {min:.0} min, max {max:.0} min"
        ),
        _ => println!("   Wait at alert (7d):  no alerts sent"),
    }
}
