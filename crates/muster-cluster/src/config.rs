//! Cluster configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use muster_engine::TlsConfig;

/// Runtime configuration for the cluster core.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Discovery provider endpoint string (provider-specific).
    pub discovery: String,
    /// Discovery heartbeat and engine refresh cadence.
    pub heartbeat: Duration,
    /// Capacity overcommit ratio applied to engine totals.
    pub overcommit_ratio: f64,
    /// Health monitor cycle interval.
    pub monitor_interval: Duration,
    /// Base failover grace step; failover waits one then two steps.
    pub failover_grace: Duration,
    /// Consecutive failed probes before an engine goes unhealthy.
    pub engine_failure_threshold: u32,
    /// TLS material handed to the driver, never read by the core.
    pub tls: Option<TlsConfig>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            discovery: String::new(),
            heartbeat: Duration::from_secs(10),
            overcommit_ratio: 0.05,
            monitor_interval: Duration::from_secs(5),
            failover_grace: Duration::from_secs(5),
            engine_failure_threshold: 3,
            tls: None,
        }
    }
}

impl ClusterConfig {
    /// Config with the given discovery endpoint and defaults elsewhere.
    pub fn new(discovery: impl Into<String>) -> Self {
        Self {
            discovery: discovery.into(),
            ..Self::default()
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_overcommit_ratio(mut self, ratio: f64) -> Self {
        self.overcommit_ratio = ratio;
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn with_failover_grace(mut self, grace: Duration) -> Self {
        self.failover_grace = grace;
        self
    }

    pub fn with_engine_failure_threshold(mut self, threshold: u32) -> Self {
        self.engine_failure_threshold = threshold;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let file: ClusterConfigFile = toml::from_str(content)?;
        Ok(file.into())
    }
}

/// On-disk form of [`ClusterConfig`]; durations in seconds.
#[derive(Debug, Deserialize)]
struct ClusterConfigFile {
    discovery: String,
    heartbeat_secs: Option<u64>,
    overcommit_ratio: Option<f64>,
    monitor_interval_secs: Option<u64>,
    failover_grace_secs: Option<u64>,
    engine_failure_threshold: Option<u32>,
    tls: Option<TlsFileConfig>,
}

#[derive(Debug, Deserialize)]
struct TlsFileConfig {
    ca: PathBuf,
    cert: PathBuf,
    key: PathBuf,
}

impl From<ClusterConfigFile> for ClusterConfig {
    fn from(file: ClusterConfigFile) -> Self {
        let defaults = ClusterConfig::default();
        Self {
            discovery: file.discovery,
            heartbeat: file
                .heartbeat_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat),
            overcommit_ratio: file.overcommit_ratio.unwrap_or(defaults.overcommit_ratio),
            monitor_interval: file
                .monitor_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.monitor_interval),
            failover_grace: file
                .failover_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.failover_grace),
            engine_failure_threshold: file
                .engine_failure_threshold
                .unwrap_or(defaults.engine_failure_threshold),
            tls: file.tls.map(|t| TlsConfig {
                ca_path: t.ca,
                cert_path: t.cert,
                key_path: t.key,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ClusterConfig::default();
        assert_eq!(config.monitor_interval, Duration::from_secs(5));
        assert_eq!(config.failover_grace, Duration::from_secs(5));
        assert!(config.tls.is_none());
    }

    #[test]
    fn parses_full_toml() {
        let config = ClusterConfig::from_toml(
            r#"
            discovery = "zk://10.0.0.9:2181/muster"
            heartbeat_secs = 20
            overcommit_ratio = 0.1
            monitor_interval_secs = 3
            failover_grace_secs = 2
            engine_failure_threshold = 5

            [tls]
            ca = "/etc/muster/ca.pem"
            cert = "/etc/muster/cert.pem"
            key = "/etc/muster/key.pem"
            "#,
        )
        .unwrap();

        assert_eq!(config.discovery, "zk://10.0.0.9:2181/muster");
        assert_eq!(config.heartbeat, Duration::from_secs(20));
        assert_eq!(config.overcommit_ratio, 0.1);
        assert_eq!(config.engine_failure_threshold, 5);
        assert!(config.tls.is_some());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = ClusterConfig::from_toml(r#"discovery = "static://""#).unwrap();
        assert_eq!(config.heartbeat, Duration::from_secs(10));
        assert_eq!(config.overcommit_ratio, 0.05);
    }

    #[test]
    fn builder_overrides() {
        let config = ClusterConfig::new("static://")
            .with_monitor_interval(Duration::from_millis(50))
            .with_failover_grace(Duration::from_millis(10))
            .with_engine_failure_threshold(1);

        assert_eq!(config.monitor_interval, Duration::from_millis(50));
        assert_eq!(config.engine_failure_threshold, 1);
    }
}
