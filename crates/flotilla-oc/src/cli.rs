//!
//! # CLI for the orchestration controller
//!
//! Command line options are collected and transformed into an `OcConfig`.
//!
//! Configuration values are resolved in the following order of precedence:
//!     1) default values
//!     2) custom configuration file if provided
//!     3) cli parameters
//!

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use crate::config::OcConfig;

#[derive(Debug, Parser)]
#[command(name = "flotilla-oc", about = "Flotilla Orchestration Controller")]
pub struct OcOpt {
    /// directory where object specs are persisted; runs memory-only when unset
    #[arg(long, value_name = "dir", env = "FLOTILLA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// yaml configuration file
    #[arg(long, value_name = "path")]
    config: Option<PathBuf>,

    /// reconciler resync cadence in seconds
    #[arg(long, value_name = "seconds")]
    resync_secs: Option<u64>,

    /// autoscaler evaluation cadence in seconds
    #[arg(long, value_name = "seconds")]
    autoscaler_secs: Option<u64>,

    /// utilization sample staleness bound in seconds
    #[arg(long, value_name = "seconds")]
    metrics_staleness_secs: Option<u64>,

    /// bound on a single runtime operation in seconds
    #[arg(long, value_name = "seconds")]
    runtime_timeout_secs: Option<u64>,
}

impl OcOpt {
    /// resolve cli options into the controller configuration
    pub fn as_config(self) -> Result<OcConfig> {
        let mut config = match &self.config {
            Some(path) => OcConfig::load_from(path)?,
            None => OcConfig::default(),
        };

        if let Some(dir) = self.data_dir {
            config.data_dir = Some(dir);
        }
        if let Some(secs) = self.resync_secs {
            config.resync_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.autoscaler_secs {
            config.autoscaler_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.metrics_staleness_secs {
            config.metrics_staleness = Duration::from_secs(secs);
        }
        if let Some(secs) = self.runtime_timeout_secs {
            config.runtime_op_timeout = Duration::from_secs(secs);
        }

        debug!(?config, "resolved controller config");
        Ok(config)
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_cli_overrides_defaults() {
        let opt = OcOpt::parse_from([
            "flotilla-oc",
            "--data-dir",
            "/tmp/flotilla",
            "--resync-secs",
            "7",
        ]);
        let config = opt.as_config().expect("config");
        assert_eq!(config.data_dir.as_deref(), Some(std::path::Path::new("/tmp/flotilla")));
        assert_eq!(config.resync_interval, Duration::from_secs(7));
        // untouched values keep defaults
        assert_eq!(config.autoscaler_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_cli_beats_config_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "resyncInterval: 60s\nautoscalerInterval: 20s\n").expect("write");

        let config_path = file.path().to_str().expect("utf8 path");
        let opt = OcOpt::parse_from(["flotilla-oc", "--config", config_path, "--resync-secs", "5"]);
        let config = opt.as_config().expect("config");

        // cli wins over file, file wins over default
        assert_eq!(config.resync_interval, Duration::from_secs(5));
        assert_eq!(config.autoscaler_interval, Duration::from_secs(20));
    }
}
