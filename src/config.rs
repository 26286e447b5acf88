//! Environment-derived configuration. Every knob has a default so a bare
//! process starts against local collaborators with publishing disabled.

use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub search_url: String,
    pub answer_url: String,
    pub complaint_url: String,
    pub document_url: String,
    /// Message-sink endpoints. Empty disables the publisher entirely.
    pub event_brokers: Vec<String>,
    pub flows_dir: PathBuf,
    pub compiled_flows_dir: PathBuf,
    pub log_level: String,
    pub metrics_port: Option<u16>,
    /// Overrides every hoop's per-call deadline when set.
    pub hoop_timeout: Option<Duration>,
    pub retry_max_attempts: Option<u32>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let event_brokers = get("EVENT_BROKERS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            search_url: var("SEARCH_SERVICE_URL", "http://localhost:8101"),
            answer_url: var("ANSWER_SERVICE_URL", "http://localhost:8102"),
            complaint_url: var("COMPLAINT_SERVICE_URL", "http://localhost:8103"),
            document_url: var("DOCUMENT_SERVICE_URL", "http://localhost:8104"),
            event_brokers,
            flows_dir: PathBuf::from(var("FLOWS_DIR", "flows")),
            compiled_flows_dir: PathBuf::from(var("COMPILED_FLOWS_DIR", "flows/compiled")),
            log_level: var("LOG_LEVEL", "hoopflow=info"),
            metrics_port: get("METRICS_PORT").and_then(|v| v.parse().ok()),
            hoop_timeout: get("HOOP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs),
            retry_max_attempts: get("RETRY_MAX_ATTEMPTS").and_then(|v| v.parse().ok()),
        }
    }

    /// Resolve a flow path the way the CLI sees it: absolute paths and paths
    /// that already exist are taken as-is, everything else is looked up under
    /// the configured base directory.
    pub fn resolve_flow_path(&self, path: &Path, compiled: bool) -> PathBuf {
        if path.is_absolute() || path.exists() {
            return path.to_path_buf();
        }
        let base = if compiled {
            &self.compiled_flows_dir
        } else {
            &self.flows_dir
        };
        base.join(path)
    }
}
