//! Service configuration read from the environment.

use crate::error::{GatewayError, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tile38_client::PoolConfig;

/// Roaming radius, in meters, for proximity fences and queries.
pub const DEFAULT_ROAM_METERS: f64 = 100.0;

/// Lifetime of a person record that is not refreshed.
pub const DEFAULT_PERSON_TTL: Duration = Duration::from_secs(5);

/// Places loaded at startup when `PLACES` is unset.
pub const DEFAULT_PLACES: &[&str] = &["convention-center", "hyatt-regency"];

/// Configuration for the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub tile38_url: String,
    pub http_port: u16,
    pub metrics_port: u16,
    /// Directory holding `<place>.geo.json` fixtures.
    pub fences_dir: PathBuf,
    pub places: Vec<String>,
    pub roam_meters: f64,
    pub person_ttl: Duration,
    pub pool: PoolConfig,
    /// First re-subscribe delay after the subscription drops.
    pub reconnect_delay: Duration,
    /// Ceiling for the doubling re-subscribe delay.
    pub max_reconnect_delay: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            tile38_url: "redis://127.0.0.1:9851".to_string(),
            http_port: 8000,
            metrics_port: 9093,
            fences_dir: PathBuf::from("fences"),
            places: DEFAULT_PLACES.iter().map(|p| p.to_string()).collect(),
            roam_meters: DEFAULT_ROAM_METERS,
            person_ttl: DEFAULT_PERSON_TTL,
            pool: PoolConfig::default(),
            reconnect_delay: Duration::from_millis(500),
            max_reconnect_delay: Duration::from_secs(10),
        }
    }
}

impl RelayConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup; unset keys keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("TILE38_URL") {
            config.tile38_url = url;
        }
        if let Some(port) = parse_var(&lookup, "HTTP_PORT")? {
            config.http_port = port;
        }
        if let Some(port) = parse_var(&lookup, "METRICS_PORT")? {
            config.metrics_port = port;
        }
        if let Some(dir) = lookup("FENCES_DIR") {
            config.fences_dir = PathBuf::from(dir);
        }
        if let Some(places) = lookup("PLACES") {
            config.places = places
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(meters) = parse_var::<f64, _>(&lookup, "ROAM_METERS")? {
            if !(meters.is_finite() && meters > 0.0) {
                return Err(GatewayError::Config(format!(
                    "ROAM_METERS must be positive, got {}",
                    meters
                )));
            }
            config.roam_meters = meters;
        }
        if let Some(secs) = parse_var(&lookup, "PERSON_TTL_SECS")? {
            config.person_ttl = Duration::from_secs(secs);
        }
        if let Some(max_idle) = parse_var(&lookup, "POOL_MAX_IDLE")? {
            if max_idle == 0 {
                return Err(GatewayError::Config("POOL_MAX_IDLE must be > 0".into()));
            }
            config.pool.max_idle = max_idle;
        }
        if let Some(secs) = parse_var(&lookup, "POOL_IDLE_TIMEOUT_SECS")? {
            config.pool.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var(&lookup, "RECONNECT_DELAY_MS")? {
            config.reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "MAX_RECONNECT_DELAY_MS")? {
            config.max_reconnect_delay = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| GatewayError::Config(format!("{} must be a number, got '{}'", key, raw))),
        None => Ok(None),
    }
}
