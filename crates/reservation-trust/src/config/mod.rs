use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::trust::policy::TrustPolicy;

/// Ten years. Policy spans feed chrono arithmetic, which panics on overflow.
const MAX_POLICY_DAYS: i64 = 3_650;
const SUSPENSION_DAYS: RangeInclusive<u32> = 0..=MAX_POLICY_DAYS as u32;
const RESPONSE_WINDOW_HOURS: RangeInclusive<i64> = 1..=MAX_POLICY_DAYS * 24;
const FALSE_NO_SHOW_WINDOW_DAYS: RangeInclusive<i64> = 1..=MAX_POLICY_DAYS;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub audit: AuditConfig,
    pub sweep: SweepConfig,
    /// Bearer token for admin routes; unset leaves only the `x-admin-id` check.
    pub admin_token: Option<String>,
    pub policy: TrustPolicy,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let storage = StorageConfig {
            database_path: optional_path("TRUST_DATABASE_PATH"),
            busy_timeout: Duration::from_millis(parse_var("TRUST_DB_BUSY_TIMEOUT_MS", 5_000)?),
        };

        let audit = AuditConfig {
            csv_path: optional_path("TRUST_AUDIT_CSV_PATH"),
            backlog_alert: parse_var("TRUST_AUDIT_BACKLOG_ALERT", 100)?,
        };

        let sweep_secs: u64 = parse_var("TRUST_SWEEP_INTERVAL_SECS", 300)?;
        let sweep = SweepConfig {
            interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
        };

        let admin_token = env::var("TRUST_ADMIN_TOKEN")
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());

        let mut policy = TrustPolicy::default();
        policy.scoring.suspension_threshold =
            parse_var("TRUST_SUSPENSION_THRESHOLD", policy.scoring.suspension_threshold)?;
        policy.scoring.consecutive_no_show_limit = parse_var(
            "TRUST_CONSECUTIVE_NO_SHOW_LIMIT",
            policy.scoring.consecutive_no_show_limit,
        )?;
        policy.scoring.suspension_days = parse_within(
            "TRUST_SUSPENSION_DAYS",
            policy.scoring.suspension_days,
            SUSPENSION_DAYS,
        )?;
        policy.disputes.response_window_hours = parse_within(
            "TRUST_RESPONSE_WINDOW_HOURS",
            policy.disputes.response_window_hours,
            RESPONSE_WINDOW_HOURS,
        )?;
        policy.sanctions.false_no_show_threshold = parse_var(
            "TRUST_FALSE_NO_SHOW_THRESHOLD",
            policy.sanctions.false_no_show_threshold,
        )?;
        policy.sanctions.false_no_show_window_days = parse_within(
            "TRUST_FALSE_NO_SHOW_WINDOW_DAYS",
            policy.sanctions.false_no_show_window_days,
            FALSE_NO_SHOW_WINDOW_DAYS,
        )?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            storage,
            audit,
            sweep,
            admin_token,
            policy,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where trust state lives. No path means a process-local in-memory store.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_path: Option<PathBuf>,
    pub busy_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub csv_path: Option<PathBuf>,
    pub backlog_alert: usize,
}

#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// `None` disables the background sweeper.
    pub interval: Option<Duration>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be an integer within its supported range, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Like `parse_var`, but values outside `range` are rejected as well.
fn parse_within<T>(
    key: &'static str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + fmt::Display,
{
    let value = parse_var(key, default)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidNumber {
            key,
            value: value.to_string(),
        })
    }
}

fn optional_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}
