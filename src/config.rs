use std::path::PathBuf;
use std::time::Duration;

/// Engine settings. `Default` suits tests; hosts usually call [`EngineConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory holding the WAL.
    pub data_dir: PathBuf,
    /// Longest an admission waits for its listing's write lock before giving
    /// up with a transient error.
    pub lock_timeout: Duration,
    /// Compact the WAL after this many appends.
    pub compact_threshold: u64,
    /// How often the compactor checks the threshold.
    pub compact_interval: Duration,
    /// Prometheus exporter port; `None` leaves metrics uninstalled.
    pub metrics_port: Option<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            lock_timeout: Duration::from_secs(5),
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(60),
            metrics_port: None,
        }
    }
}

impl EngineConfig {
    /// Read `STAYLINE_*` variables, falling back to the defaults for anything
    /// unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let data_dir = lookup("STAYLINE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let lock_timeout = lookup("STAYLINE_LOCK_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.lock_timeout);
        let compact_threshold = lookup("STAYLINE_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.compact_threshold);
        let compact_interval = lookup("STAYLINE_COMPACT_INTERVAL_SECS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.compact_interval);
        let metrics_port = lookup("STAYLINE_METRICS_PORT").and_then(|s| s.parse().ok());

        Self {
            data_dir,
            lock_timeout,
            compact_threshold,
            compact_interval,
            metrics_port,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn unset_env_gives_defaults() {
        let cfg = EngineConfig::from_lookup(|_| None);
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.wal_path(), PathBuf::from("./data/reservations.wal"));
    }

    #[test]
    fn env_overrides_and_bad_values() {
        let vars: HashMap<&str, &str> = [
            ("STAYLINE_DATA_DIR", "/var/lib/stayline"),
            ("STAYLINE_LOCK_TIMEOUT_MS", "250"),
            ("STAYLINE_COMPACT_THRESHOLD", "not-a-number"),
            ("STAYLINE_METRICS_PORT", "9100"),
        ]
        .into_iter()
        .collect();
        let cfg = EngineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/stayline"));
        assert_eq!(cfg.lock_timeout, Duration::from_millis(250));
        assert_eq!(cfg.compact_threshold, 1000);
        assert_eq!(cfg.metrics_port, Some(9100));
    }
}
