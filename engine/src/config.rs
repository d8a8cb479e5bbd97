//! Configuration management for the BloodBridge daemon.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::app::DEFAULT_BASE_URL;
use crate::matching::{COOLDOWN_DAYS, MATCH_RADIUS_KM, MatchingPolicy, RESPONSE_WINDOW_SECS};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Record store configuration
    pub storage: StorageConfig,
    /// Matching policy and sweeper configuration
    pub matching: MatchingConfig,
    /// SMTP configuration; `None` selects the console notifier
    pub smtp: Option<SmtpConfig>,
    /// Daemon configuration
    pub server: ServerConfig,
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON file per table
    pub data_dir: PathBuf,
}

/// Matching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Notification radius in kilometres
    pub radius_km: f64,
    /// Response window in seconds
    pub response_window_secs: i64,
    /// Cooldown after a donation, in days
    pub cooldown_days: u64,
    /// Expiry sweeper period in seconds
    pub sweep_interval_secs: u64,
    /// Base URL for donor login links
    pub base_url: String,
}

impl MatchingConfig {
    /// Policy for the stores and the orchestrator
    #[must_use]
    pub const fn policy(&self) -> MatchingPolicy {
        MatchingPolicy {
            radius_km: self.radius_km,
            response_window_secs: self.response_window_secs,
            cooldown_days: self.cooldown_days,
        }
    }
}

/// SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host
    pub host: String,
    /// Relay port (STARTTLS)
    pub port: u16,
    /// Login user
    pub username: String,
    /// Login password
    #[serde(skip_serializing, default)]
    pub password: String,
    /// Sender address
    pub from_email: String,
    /// Sender display name
    pub from_name: String,
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Metrics server host (for Prometheus scraping)
    pub metrics_host: String,
    /// Metrics server port
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup. Missing or unparseable values
    /// fall back to their defaults.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let smtp = lookup("SMTP_HOST")
            .filter(|host| !host.trim().is_empty())
            .map(|host| {
                let username = lookup("SMTP_USERNAME").unwrap_or_default();
                SmtpConfig {
                    host,
                    port: parsed(&lookup, "SMTP_PORT", 587),
                    password: lookup("SMTP_PASSWORD").unwrap_or_default(),
                    from_email: lookup("SMTP_FROM_EMAIL").unwrap_or_else(|| username.clone()),
                    from_name: lookup("SMTP_FROM_NAME").unwrap_or_else(|| "BloodBridge".to_string()),
                    username,
                }
            });

        Self {
            storage: StorageConfig {
                data_dir: lookup("BLOODBRIDGE_DATA_DIR").map_or_else(|| PathBuf::from("data"), PathBuf::from),
            },
            matching: MatchingConfig {
                radius_km: parsed(&lookup, "BLOODBRIDGE_MATCH_RADIUS_KM", MATCH_RADIUS_KM),
                response_window_secs: parsed(&lookup, "BLOODBRIDGE_RESPONSE_WINDOW_SECS", RESPONSE_WINDOW_SECS),
                cooldown_days: parsed(&lookup, "BLOODBRIDGE_COOLDOWN_DAYS", COOLDOWN_DAYS),
                sweep_interval_secs: parsed(&lookup, "BLOODBRIDGE_SWEEP_INTERVAL_SECS", 30),
                base_url: lookup("BLOODBRIDGE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            },
            smtp,
            server: ServerConfig {
                metrics_host: lookup("METRICS_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                metrics_port: parsed(&lookup, "METRICS_PORT", 9090),
                shutdown_timeout: parsed(&lookup, "SHUTDOWN_TIMEOUT", 10),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
