use chrono::{Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration as StdDuration};

use crate::{
    alerts::{AlertWindows, SchedulerSettings},
    notify::StdoutFormat,
    recurrence::ResolveMode,
    store::{DatabaseConfig, DatabaseType},
    Error, Result,
};

/// Added to the poll interval for the default `Level2` window so a tick
/// sampled slightly late still lands inside it.
const DEADLINE_WINDOW_SLACK_SECS: u64 = 5;
/// Upper bound for every configured alert duration.
const MAX_WINDOW_DAYS: i64 = 3_650;
const MAX_WINDOW_SECS: u64 = MAX_WINDOW_DAYS as u64 * 86_400;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub alerts: AlertConfig,
    pub smtp: Option<SmtpConfig>,
    pub notify: NotifyConfig,
    pub recurrence: RecurrenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertConfig {
    pub poll_interval_secs: u64,
    pub same_day_fraction: f64,
    pub lead_days: i64,
    pub overdue_grace_days: i64,
    pub deadline_window_secs: u64,
    pub dedup_ttl_secs: u64,
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub from: String,
    #[serde(skip_serializing)]
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub signature: String,
    pub stdout_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceConfig {
    pub strict: bool,
}

impl AlertConfig {
    pub fn offset(&self) -> FixedOffset {
        offset_from_minutes(self.utc_offset_minutes).unwrap_or_else(|| Utc.fix())
    }

    pub fn windows(&self) -> AlertWindows {
        AlertWindows {
            same_day_fraction: self.same_day_fraction,
            lead: bounded_days(self.lead_days),
            deadline_window: bounded_seconds(self.deadline_window_secs),
            overdue_grace: bounded_days(self.overdue_grace_days),
            offset: self.offset(),
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            poll_interval: StdDuration::from_secs(self.poll_interval_secs),
            dedup_ttl: bounded_seconds(self.dedup_ttl_secs),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("ALERT_POLL_INTERVAL_SECS must be at least 1".to_string()));
        }
        for (key, secs) in [
            ("ALERT_POLL_INTERVAL_SECS", self.poll_interval_secs),
            ("ALERT_DEADLINE_WINDOW_SECS", self.deadline_window_secs),
            ("ALERT_DEDUP_TTL_SECS", self.dedup_ttl_secs),
        ] {
            if secs > MAX_WINDOW_SECS {
                return Err(Error::Config(format!(
                    "{} must be at most {} seconds, got {}",
                    key, MAX_WINDOW_SECS, secs
                )));
            }
        }
        for (key, days) in [
            ("ALERT_LEAD_DAYS", self.lead_days),
            ("ALERT_OVERDUE_GRACE_DAYS", self.overdue_grace_days),
        ] {
            if days > MAX_WINDOW_DAYS {
                return Err(Error::Config(format!(
                    "{} must be at most {} days, got {}",
                    key, MAX_WINDOW_DAYS, days
                )));
            }
        }
        if !(self.same_day_fraction > 0.0 && self.same_day_fraction <= 1.0) {
            return Err(Error::Config(format!(
                "ALERT_SAME_DAY_FRACTION must be in (0, 1], got {}",
                self.same_day_fraction
            )));
        }
        if self.lead_days < 0 || self.overdue_grace_days < 0 {
            return Err(Error::Config(
                "ALERT_LEAD_DAYS and ALERT_OVERDUE_GRACE_DAYS must not be negative".to_string(),
            ));
        }
        if self.deadline_window_secs == 0 {
            return Err(Error::Config("ALERT_DEADLINE_WINDOW_SECS must be at least 1".to_string()));
        }
        if self.dedup_ttl_secs < self.poll_interval_secs {
            return Err(Error::Config(
                "ALERT_DEDUP_TTL_SECS must be at least the poll interval".to_string(),
            ));
        }
        if offset_from_minutes(self.utc_offset_minutes).is_none() {
            return Err(Error::Config(format!(
                "ALERT_UTC_OFFSET_MINUTES out of range: {}",
                self.utc_offset_minutes
            )));
        }
        Ok(())
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            same_day_fraction: 0.8,
            lead_days: 2,
            overdue_grace_days: 2,
            deadline_window_secs: 60 + DEADLINE_WINDOW_SLACK_SECS,
            dedup_ttl_secs: 120,
            utc_offset_minutes: 0,
        }
    }
}

impl RecurrenceConfig {
    pub fn resolve_mode(&self) -> ResolveMode {
        if self.strict {
            ResolveMode::Strict
        } else {
            ResolveMode::Lenient
        }
    }
}

impl NotifyConfig {
    pub fn stdout_format(&self) -> Result<StdoutFormat> {
        self.stdout_format
            .parse()
            .map_err(|e: crate::notify::NotifyError| Error::Config(e.to_string()))
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from a variable lookup, applying defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let db_type = match var("DATABASE_TYPE")
            .unwrap_or_else(|| "sqlite".to_string())
            .to_lowercase()
            .as_str()
        {
            "sqlite" => DatabaseType::Sqlite,
            "postgres" | "postgresql" => DatabaseType::Postgres,
            other => {
                return Err(Error::Config(format!("Invalid DATABASE_TYPE: {}", other)));
            }
        };

        let poll_interval_secs = parse_var(&var, "ALERT_POLL_INTERVAL_SECS", 60u64)?;
        let alerts = AlertConfig {
            poll_interval_secs,
            same_day_fraction: parse_var(&var, "ALERT_SAME_DAY_FRACTION", 0.8f64)?,
            lead_days: parse_var(&var, "ALERT_LEAD_DAYS", 2i64)?,
            overdue_grace_days: parse_var(&var, "ALERT_OVERDUE_GRACE_DAYS", 2i64)?,
            deadline_window_secs: parse_var(
                &var,
                "ALERT_DEADLINE_WINDOW_SECS",
                poll_interval_secs.saturating_add(DEADLINE_WINDOW_SLACK_SECS),
            )?,
            dedup_ttl_secs: parse_var(&var, "ALERT_DEDUP_TTL_SECS", poll_interval_secs.saturating_mul(2))?,
            utc_offset_minutes: parse_var(&var, "ALERT_UTC_OFFSET_MINUTES", 0i32)?,
        };

        let smtp = match var("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_var(&var, "SMTP_PORT", 587u16)?,
                tls: parse_bool(&var, "SMTP_TLS", true)?,
                from: var("SMTP_FROM").ok_or_else(|| {
                    Error::Config("SMTP_FROM must be set when SMTP_HOST is set".to_string())
                })?,
                username: var("SMTP_USERNAME"),
                password: var("SMTP_PASSWORD"),
            }),
            None => None,
        };

        let config = Config {
            server: ServerConfig {
                addr: var("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            },
            database: DatabaseConfig {
                db_type,
                sqlite_path: Some(
                    var("SQLITE_PATH")
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from("data/maintwatch.db")),
                ),
                connection_string: var("DATABASE_URL"),
                max_connections: parse_var(&var, "DATABASE_MAX_CONNECTIONS", 5u32)?,
            },
            alerts,
            smtp,
            notify: NotifyConfig {
                signature: var("MAIL_SIGNATURE")
                    .unwrap_or_else(|| "Maintenance Administration".to_string()),
                stdout_format: var("NOTIFY_STDOUT_FORMAT").unwrap_or_else(|| "json".to_string()),
            },
            recurrence: RecurrenceConfig {
                strict: parse_bool(&var, "RECURRENCE_STRICT", false)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate().map_err(Error::Config)?;
        self.alerts.validate()?;
        self.notify.stdout_format()?;

        if self.smtp.is_none() {
            tracing::warn!("SMTP_HOST is not set. Alerts will be printed to stdout.");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                addr: "0.0.0.0:8080".to_string(),
            },
            database: DatabaseConfig::default(),
            alerts: AlertConfig::default(),
            smtp: None,
            notify: NotifyConfig {
                signature: "Maintenance Administration".to_string(),
                stdout_format: "json".to_string(),
            },
            recurrence: RecurrenceConfig { strict: false },
        }
    }
}

fn bounded_days(days: i64) -> Duration {
    Duration::days(days.clamp(0, MAX_WINDOW_DAYS))
}

fn bounded_seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_WINDOW_SECS) as i64)
}

fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    minutes.checked_mul(60).and_then(FixedOffset::east_opt)
}

fn parse_var<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("Invalid value for {}: {}", key, raw))),
        None => Ok(default),
    }
}

fn parse_bool<F>(var: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key).map(|v| v.to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::Config(format!("Invalid value for {}: {}", key, v))),
        },
    }
}
