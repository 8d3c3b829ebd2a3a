//! DeskWatch configuration system.
//!
//! Loaded from a TOML file (default `~/.deskwatch/config.toml`); every field
//! has a default so a partial file is enough. The CLI overrides individual
//! fields after loading.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DeskWatchError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskWatchConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub freescout: FreeScoutConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub business_hours: BusinessHoursConfig,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default)]
    pub auto_vacuum: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default)]
    pub stats: bool,
}

fn default_db_path() -> String { "~/.deskwatch/notifications.db".into() }
fn default_retention_days() -> i64 { 90 }
fn default_log_format() -> String { "text".into() }
fn bool_true() -> bool { true }

impl Default for DeskWatchConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            freescout: FreeScoutConfig::default(),
            slack: SlackConfig::default(),
            rules: RulesConfig::default(),
            business_hours: BusinessHoursConfig::default(),
            retention_days: default_retention_days(),
            auto_vacuum: false,
            dry_run: false,
            verbose: false,
            log_format: default_log_format(),
            stats: false,
        }
    }
}

impl DeskWatchConfig {
    /// Load config from the default path, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DeskWatchError::Config(format!("Failed to read config {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DeskWatchError::Config(format!("Failed to parse config: {e}")))
    }

    /// Default config path (~/.deskwatch/config.toml).
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// The DeskWatch home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".deskwatch")
    }

    /// `db_path` with `~` and env vars expanded.
    pub fn expanded_db_path(&self) -> PathBuf {
        expand_path(&self.db_path)
    }

    /// Check the settings a run depends on.
    ///
    /// `requires_webhook` is false for modes that never post to Slack
    /// (dry-run, schema init, stats, cleanup, connection checks).
    pub fn validate(&self, requires_webhook: bool) -> Result<()> {
        if self.freescout.dsn.trim().is_empty() {
            return Err(DeskWatchError::config("freescout.dsn is required"));
        }
        self.freescout.parse_dsn()?;

        if self.freescout.url.trim().is_empty() {
            return Err(DeskWatchError::config("freescout.url is required"));
        }
        if requires_webhook && self.slack.webhook_url.trim().is_empty() {
            return Err(DeskWatchError::config("slack.webhook_url is required"));
        }
        if self.slack.retry_attempts == 0 {
            return Err(DeskWatchError::config("slack.retry_attempts must be at least 1"));
        }

        let bh = &self.business_hours;
        if bh.start_hour > 23 {
            return Err(DeskWatchError::config("business_hours.start_hour must be 0-23"));
        }
        if bh.end_hour > 23 {
            return Err(DeskWatchError::config("business_hours.end_hour must be 0-23"));
        }
        if bh.start_hour >= bh.end_hour {
            return Err(DeskWatchError::config(
                "business_hours.start_hour must be before business_hours.end_hour",
            ));
        }
        if let Some(day) = bh.work_days.iter().find(|d| !(1..=7).contains(*d)) {
            return Err(DeskWatchError::Config(format!(
                "business_hours.work_days: {day} is not a weekday (1=Mon .. 7=Sun)"
            )));
        }

        match self.log_format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(DeskWatchError::Config(format!(
                    "log_format must be 'text' or 'json', got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// FreeScout (MySQL) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreeScoutConfig {
    /// `user:password@tcp(host:port)/database?options` or a `mysql://` URL.
    #[serde(default)]
    pub dsn: String,
    #[serde(default = "default_freescout_timeout", with = "duration_str")]
    pub timeout: Duration,
    /// Base URL used to build ticket links.
    #[serde(default = "default_freescout_url")]
    pub url: String,
}

fn default_freescout_timeout() -> Duration { Duration::from_secs(30) }
fn default_freescout_url() -> String { "https://support.example.com".into() }

impl Default for FreeScoutConfig {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            timeout: default_freescout_timeout(),
            url: default_freescout_url(),
        }
    }
}

/// A FreeScout DSN, either a ready `mysql://` URL or the pieces of a
/// `user:pass@tcp(host:port)/db` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MySqlDsn {
    Url(String),
    Parts(DsnParts),
}

/// Connection pieces taken from a `user:pass@tcp(host:port)/db` DSN.
/// Credentials are kept raw; the driver escapes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsnParts {
    pub user: String,
    pub password: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
}

impl FreeScoutConfig {
    /// Parse the configured DSN.
    ///
    /// Query options of the `tcp(...)` form are dropped since they only mean
    /// something to Go drivers.
    pub fn parse_dsn(&self) -> Result<MySqlDsn> {
        let dsn = self.dsn.trim();
        if dsn.starts_with("mysql://") || dsn.starts_with("mariadb://") {
            return Ok(MySqlDsn::Url(dsn.to_string()));
        }
        if dsn.starts_with("tcp://") {
            return Err(DeskWatchError::config(
                "DSN should not include 'tcp://', use 'user:password@tcp(host:port)/database'",
            ));
        }

        let invalid = || {
            DeskWatchError::config(
                "DSN must be in format 'user:password@tcp(host:port)/database?options'",
            )
        };

        let (credentials, rest) = dsn.rsplit_once('@').ok_or_else(invalid)?;
        let rest = rest.strip_prefix("tcp(").ok_or_else(invalid)?;
        let (address, rest) = rest.split_once(')').ok_or_else(invalid)?;
        let rest = rest.strip_prefix('/').ok_or_else(invalid)?;
        let database = rest.split('?').next().unwrap_or_default();
        if address.is_empty() || database.is_empty() {
            return Err(invalid());
        }

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| DeskWatchError::Config(format!("invalid DSN port '{port}'")))?;
                (host, Some(port))
            }
            None => (address, None),
        };
        if host.is_empty() {
            return Err(invalid());
        }

        let (user, password) = match credentials.split_once(':') {
            Some((u, p)) => (u, Some(p.to_string())),
            None => (credentials, None),
        };

        Ok(MySqlDsn::Parts(DsnParts {
            user: user.to_string(),
            password,
            host: host.to_string(),
            port,
            database: database.to_string(),
        }))
    }
}

/// Slack incoming-webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default = "default_slack_timeout", with = "duration_str")]
    pub timeout: Duration,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// First backoff delay; doubles on every further attempt.
    #[serde(default = "default_retry_base_delay", with = "duration_str")]
    pub retry_base_delay: Duration,
}

fn default_slack_timeout() -> Duration { Duration::from_secs(10) }
fn default_retry_attempts() -> u32 { 3 }
fn default_retry_base_delay() -> Duration { Duration::from_secs(1) }

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            timeout: default_slack_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay: default_retry_base_delay(),
        }
    }
}

/// When a ticket becomes eligible, and how often it may be re-notified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default = "default_open_threshold", with = "duration_str")]
    pub open_threshold: Duration,
    #[serde(default = "default_pending_threshold", with = "duration_str")]
    pub pending_threshold: Duration,
    #[serde(default = "default_cooldown", with = "duration_str")]
    pub cooldown_period: Duration,
    /// Burst cap for the start-of-day flush.
    #[serde(default = "default_max_notifications")]
    pub max_notifications_per_run: usize,
    /// Pause between consecutive sends of a flush burst.
    #[serde(default = "default_flush_delay", with = "duration_str")]
    pub flush_delay: Duration,
}

fn default_open_threshold() -> Duration { Duration::from_secs(2 * 3600) }
fn default_pending_threshold() -> Duration { Duration::from_secs(24 * 3600) }
fn default_cooldown() -> Duration { Duration::from_secs(4 * 3600) }
fn default_max_notifications() -> usize { 50 }
fn default_flush_delay() -> Duration { Duration::from_secs(2) }

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            open_threshold: default_open_threshold(),
            pending_threshold: default_pending_threshold(),
            cooldown_period: default_cooldown(),
            max_notifications_per_run: default_max_notifications(),
            flush_delay: default_flush_delay(),
        }
    }
}

/// Working hours, in the configured timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessHoursConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,
    /// Exclusive.
    #[serde(default = "default_end_hour")]
    pub end_hour: u32,
    /// IANA name, e.g. "America/Chicago".
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// ISO weekday numbers: 1 = Monday .. 7 = Sunday.
    #[serde(default = "default_work_days")]
    pub work_days: Vec<u32>,
    /// Flush queued notifications in the first minutes of the day.
    #[serde(default = "bool_true")]
    pub notify_on_open: bool,
    /// JSON file `{"holidays": ["YYYY-MM-DD", ...]}`; empty for none.
    #[serde(default)]
    pub holidays_file: String,
}

fn default_start_hour() -> u32 { 9 }
fn default_end_hour() -> u32 { 17 }
fn default_timezone() -> String { "America/Chicago".into() }
fn default_work_days() -> Vec<u32> { vec![1, 2, 3, 4, 5] }

impl Default for BusinessHoursConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
            timezone: default_timezone(),
            work_days: default_work_days(),
            notify_on_open: true,
            holidays_file: String::new(),
        }
    }
}

/// Parse `"1,2,3"` style weekday lists (as accepted on the command line).
pub fn parse_work_days(s: &str) -> Result<Vec<u32>> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<u32>()
                .ok()
                .filter(|d| (1..=7).contains(d))
                .ok_or_else(|| DeskWatchError::Config(format!("invalid work day '{p}' (1=Mon .. 7=Sun)")))
        })
        .collect()
}

/// Expand `~` and environment variables in a path.
pub fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(p).map(|s| s.into_owned()).unwrap_or_else(|_| p.to_string()))
}

/// Parse durations like `"90s"`, `"30m"`, `"2h"`, `"1h30m"`, `"500ms"`.
/// A bare number is read as seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DeskWatchError::config("empty duration"));
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let invalid = || DeskWatchError::Config(format!("invalid duration '{input}'"));
    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];
        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];
        total += match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            "d" => Duration::from_secs(value * 86_400),
            _ => return Err(invalid()),
        };
    }
    Ok(total)
}

/// Whole minutes in a duration, as stored and bound into queries.
pub fn whole_minutes(d: Duration) -> i64 {
    i64::try_from(d.as_secs() / 60).unwrap_or(i64::MAX)
}

/// Render a duration in the shortest form `parse_duration` reads back.
pub fn format_duration(d: Duration) -> String {
    if d.subsec_millis() != 0 || d.is_zero() {
        return format!("{}ms", d.as_millis());
    }
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{h}h"));
    }
    if m > 0 {
        out.push_str(&format!("{m}m"));
    }
    if s > 0 {
        out.push_str(&format!("{s}s"));
    }
    out
}

/// Serde adapter: durations as human strings, or integer seconds.
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(s) => super::parse_duration(&s).map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> DeskWatchConfig {
        let mut cfg = DeskWatchConfig::default();
        cfg.freescout.dsn = "fs:secret@tcp(db.local:3306)/freescout?parseTime=true".into();
        cfg.slack.webhook_url = "https://hooks.slack.com/services/T/B/X".into();
        cfg
    }

    #[test]
    fn test_defaults() {
        let cfg = DeskWatchConfig::default();
        assert_eq!(cfg.rules.open_threshold, Duration::from_secs(7200));
        assert_eq!(cfg.rules.cooldown_period, Duration::from_secs(4 * 3600));
        assert_eq!(cfg.rules.max_notifications_per_run, 50);
        assert_eq!(cfg.business_hours.work_days, vec![1, 2, 3, 4, 5]);
        assert_eq!(cfg.retention_days, 90);
    }

    #[test]
    fn test_partial_toml() {
        let cfg = DeskWatchConfig::from_toml(
            r#"
            dry_run = true

            [rules]
            open_threshold = "90m"
            cooldown_period = 3600

            [business_hours]
            timezone = "Europe/Berlin"
            work_days = [1, 2, 3]
            "#,
        )
        .unwrap();
        assert!(cfg.dry_run);
        assert_eq!(cfg.rules.open_threshold, Duration::from_secs(5400));
        assert_eq!(cfg.rules.cooldown_period, Duration::from_secs(3600));
        assert_eq!(cfg.rules.pending_threshold, Duration::from_secs(24 * 3600));
        assert_eq!(cfg.business_hours.timezone, "Europe/Berlin");
        assert_eq!(cfg.business_hours.start_hour, 9);
    }

    #[test]
    fn test_bad_duration_in_toml() {
        let err = DeskWatchConfig::from_toml("[rules]\nopen_threshold = \"two hours\"").unwrap_err();
        assert!(matches!(err, DeskWatchError::Config(_)));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("120").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("5y").is_err());
    }

    #[test]
    fn test_whole_minutes_truncates() {
        assert_eq!(whole_minutes(Duration::from_secs(2 * 3600)), 120);
        assert_eq!(whole_minutes(Duration::from_secs(90)), 1);
        assert_eq!(whole_minutes(Duration::from_secs(59)), 0);
    }

    #[test]
    fn test_format_duration_reads_back() {
        for d in [
            Duration::from_secs(7200),
            Duration::from_secs(5400),
            Duration::from_secs(61),
            Duration::from_millis(250),
        ] {
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
    }

    #[test]
    fn test_validate_ok() {
        valid_config().validate(true).unwrap();
    }

    #[test]
    fn test_validate_webhook_only_when_required() {
        let mut cfg = valid_config();
        cfg.slack.webhook_url.clear();
        assert!(cfg.validate(true).is_err());
        cfg.validate(false).unwrap();
    }

    #[test]
    fn test_validate_hours() {
        let mut cfg = valid_config();
        cfg.business_hours.start_hour = 17;
        cfg.business_hours.end_hour = 9;
        assert!(cfg.validate(true).is_err());

        cfg.business_hours.start_hour = 9;
        cfg.business_hours.end_hour = 24;
        assert!(cfg.validate(true).is_err());
    }

    #[test]
    fn test_validate_work_days_and_log_format() {
        let mut cfg = valid_config();
        cfg.business_hours.work_days = vec![1, 8];
        assert!(cfg.validate(true).is_err());

        let mut cfg = valid_config();
        cfg.log_format = "xml".into();
        assert!(cfg.validate(true).is_err());
    }

    #[test]
    fn test_parse_go_dsn() {
        let cfg = valid_config();
        assert_eq!(
            cfg.freescout.parse_dsn().unwrap(),
            MySqlDsn::Parts(DsnParts {
                user: "fs".into(),
                password: Some("secret".into()),
                host: "db.local".into(),
                port: Some(3306),
                database: "freescout".into(),
            })
        );
    }

    #[test]
    fn test_dsn_password_is_kept_raw() {
        let fs = FreeScoutConfig {
            dsn: "fs:p@ss:w/rd?#%[] é@tcp(localhost:3306)/freescout".into(),
            ..Default::default()
        };
        let MySqlDsn::Parts(parts) = fs.parse_dsn().unwrap() else {
            panic!("expected parsed parts");
        };
        assert_eq!(parts.user, "fs");
        assert_eq!(parts.password.as_deref(), Some("p@ss:w/rd?#%[] é"));
        assert_eq!(parts.host, "localhost");
    }

    #[test]
    fn test_dsn_without_port_or_password() {
        let fs = FreeScoutConfig { dsn: "reader@tcp(db.internal)/help".into(), ..Default::default() };
        let MySqlDsn::Parts(parts) = fs.parse_dsn().unwrap() else {
            panic!("expected parsed parts");
        };
        assert_eq!(parts.password, None);
        assert_eq!(parts.port, None);
        assert_eq!(parts.database, "help");
    }

    #[test]
    fn test_parse_dsn_rejects_bad_dsn() {
        for dsn in [
            "freescout",
            "tcp://u:p@host/db",
            "u:p@localhost:3306/db",
            "u:p@tcp(host:3306)/",
            "u:p@tcp(host:port)/db",
            "u:p@tcp(:3306)/db",
        ] {
            let fs = FreeScoutConfig { dsn: dsn.into(), ..Default::default() };
            assert!(fs.parse_dsn().is_err(), "{dsn} should be rejected");
        }
        let fs = FreeScoutConfig { dsn: "mysql://u:p@host/db".into(), ..Default::default() };
        assert_eq!(fs.parse_dsn().unwrap(), MySqlDsn::Url("mysql://u:p@host/db".into()));
    }

    #[test]
    fn test_parse_work_days() {
        assert_eq!(parse_work_days("1, 2,3,4,5").unwrap(), vec![1, 2, 3, 4, 5]);
        assert!(parse_work_days("1,9").is_err());
        assert!(parse_work_days("mon").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile_dir("deskwatch-config-test");
        let path = dir.join("config.toml");
        std::fs::write(&path, "log_format = \"json\"\n[freescout]\nurl = \"https://help.acme.io\"\n").unwrap();
        let cfg = DeskWatchConfig::load_from(&path).unwrap();
        assert_eq!(cfg.log_format, "json");
        assert_eq!(cfg.freescout.url, "https://help.acme.io");
        std::fs::remove_dir_all(&dir).ok();

        assert!(DeskWatchConfig::load_from(&dir.join("missing.toml")).is_err());
    }

    fn tempfile_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
