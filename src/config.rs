//! Server configuration loaded from environment variables (and `.env`).

use crate::types::DifficultyCounts;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address of the line-protocol listener
    pub listen_addr: SocketAddr,
    /// Address of the ops HTTP endpoints
    pub http_addr: SocketAddr,
    /// JSON document backing the durable store
    pub store_path: PathBuf,
    pub sweep_interval: Duration,
    pub max_participants: usize,
    pub max_duration_minutes: u32,
    /// Used when CREATE_ROOM / CREATE_PRACTICE omit counts
    pub default_counts: DifficultyCounts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 7878)),
            http_addr: SocketAddr::from(([0, 0, 0, 0], 7879)),
            store_path: PathBuf::from("data/examroom.json"),
            sweep_interval: Duration::from_secs(5),
            max_participants: 100,
            max_duration_minutes: 300,
            default_counts: DifficultyCounts::new(5, 3, 2),
        }
    }
}

impl Config {
    /// Load config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but reads values through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let listen_addr = parse_or(get("EXAM_LISTEN_ADDR"), "EXAM_LISTEN_ADDR", defaults.listen_addr);
        let http_addr = parse_or(get("EXAM_HTTP_ADDR"), "EXAM_HTTP_ADDR", defaults.http_addr);
        let store_path = get("EXAM_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.store_path);

        let sweep_secs: u64 = parse_or(
            get("EXAM_SWEEP_INTERVAL_SECS"),
            "EXAM_SWEEP_INTERVAL_SECS",
            defaults.sweep_interval.as_secs(),
        );
        let sweep_interval = if sweep_secs == 0 {
            tracing::warn!("EXAM_SWEEP_INTERVAL_SECS must be positive, using 1s");
            Duration::from_secs(1)
        } else {
            Duration::from_secs(sweep_secs)
        };

        let max_participants = parse_or(
            get("EXAM_MAX_PARTICIPANTS"),
            "EXAM_MAX_PARTICIPANTS",
            defaults.max_participants,
        );
        let max_duration_minutes = parse_or(
            get("EXAM_MAX_DURATION_MINUTES"),
            "EXAM_MAX_DURATION_MINUTES",
            defaults.max_duration_minutes,
        );

        let default_counts = match get("EXAM_DEFAULT_COUNTS") {
            Some(raw) => parse_counts(&raw).unwrap_or_else(|| {
                tracing::warn!("Invalid EXAM_DEFAULT_COUNTS '{}', using defaults", raw);
                defaults.default_counts
            }),
            None => defaults.default_counts,
        };

        Self {
            listen_addr,
            http_addr,
            store_path,
            sweep_interval,
            max_participants,
            max_duration_minutes,
            default_counts,
        }
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> T {
    match raw {
        Some(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value '{}' for {}, using default", v, key);
            default
        }),
        None => default,
    }
}

/// Parse "easy,medium,hard"
fn parse_counts(raw: &str) -> Option<DifficultyCounts> {
    let parts: Vec<u32> = raw
        .split(',')
        .map(|p| p.trim().parse().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [easy, medium, hard] => Some(DifficultyCounts::new(*easy, *medium, *hard)),
        _ => None,
    }
}
