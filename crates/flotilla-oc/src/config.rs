//!
//! # Controller Configuration
//!
//! Cluster-level tuning for the orchestration controller. Values resolve in
//! three layers: built-in defaults, then an optional YAML config file, then
//! command line flags. Durations in the file use humantime strings ("30s",
//! "5m").

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use flotilla_types::defaults::{
    AUTOSCALER_INTERVAL_SEC, BACKOFF_MAX_SEC, BACKOFF_MIN_SEC, EVENT_LOG_CAPACITY,
    METRICS_STALENESS_SEC, RECONCILER_RESYNC_SEC, RUNTIME_OP_TIMEOUT_SEC,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OcConfig {
    /// directory for spec persistence; memory-only when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// reconcilers re-read the world at this cadence even without changes
    #[serde(with = "humantime_serde")]
    pub resync_interval: Duration,

    /// autoscaler evaluation cadence, independent from resync
    #[serde(with = "humantime_serde")]
    pub autoscaler_interval: Duration,

    /// utilization samples older than this hold the previous scaling decision
    #[serde(with = "humantime_serde")]
    pub metrics_staleness: Duration,

    /// per-key retry backoff bounds
    #[serde(with = "humantime_serde")]
    pub backoff_min: Duration,
    #[serde(with = "humantime_serde")]
    pub backoff_max: Duration,

    /// bound on one runtime launch/terminate/probe call
    #[serde(with = "humantime_serde")]
    pub runtime_op_timeout: Duration,

    /// retained change events for the admin event listing
    pub event_log_capacity: usize,
}

impl Default for OcConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            resync_interval: Duration::from_secs(RECONCILER_RESYNC_SEC),
            autoscaler_interval: Duration::from_secs(AUTOSCALER_INTERVAL_SEC),
            metrics_staleness: Duration::from_secs(METRICS_STALENESS_SEC),
            backoff_min: Duration::from_secs(BACKOFF_MIN_SEC),
            backoff_max: Duration::from_secs(BACKOFF_MAX_SEC),
            runtime_op_timeout: Duration::from_secs(RUNTIME_OP_TIMEOUT_SEC),
            event_log_capacity: EVENT_LOG_CAPACITY,
        }
    }
}

impl OcConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening config file {}", path.display()))?;
        serde_yaml::from_reader(file)
            .with_context(|| format!("parsing config file {}", path.display()))
    }
}

#[cfg(test)]
mod test {

    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = OcConfig::default();
        assert_eq!(config.resync_interval, Duration::from_secs(30));
        assert_eq!(config.autoscaler_interval, Duration::from_secs(15));
        assert_eq!(config.backoff_min, Duration::from_secs(1));
        assert_eq!(config.backoff_max, Duration::from_secs(300));
        assert_eq!(config.event_log_capacity, 1024);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            "dataDir: /var/lib/flotilla\nresyncInterval: 10s\nbackoffMax: 2m\n"
        )
        .expect("write");

        let config = OcConfig::load_from(file.path()).expect("load");
        assert_eq!(config.data_dir.as_deref(), Some(Path::new("/var/lib/flotilla")));
        assert_eq!(config.resync_interval, Duration::from_secs(10));
        assert_eq!(config.backoff_max, Duration::from_secs(120));
        // untouched fields keep defaults
        assert_eq!(config.autoscaler_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_round_trip() {
        let mut config = OcConfig::default();
        config.data_dir = Some(PathBuf::from("/tmp/state"));
        config.metrics_staleness = Duration::from_secs(45);

        let yaml = serde_yaml::to_string(&config).expect("serialize");
        let back: OcConfig = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, config);
    }
}
