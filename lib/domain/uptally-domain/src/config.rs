use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_NAMESPACE: &str = "uptally-system";
pub const DEFAULT_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("store location `{0}` must look like `<namespace>/<name>`")]
    Location(String),
    #[error("aggregation interval must be greater than zero")]
    ZeroInterval,
    #[error("at least one event log source is required")]
    NoEventLogs,
    #[error("event log source name must not be empty or contain `/`: `{0}`")]
    SourceName(String),
    #[error("event log source `{0}` is configured more than once")]
    DuplicateSource(String),
    #[error("exporter `{0}` is enabled more than once")]
    DuplicateExporter(ExporterKind),
    #[error("report key must not be empty")]
    EmptyReportKey,
}

/// Addresses one keyed object in the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoreLocation {
    pub namespace: String,
    pub name: String,
}

impl StoreLocation {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl FromStr for StoreLocation {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(namespace, name))
            }
            _ => Err(ConfigError::Location(raw.to_string())),
        }
    }
}

impl TryFrom<String> for StoreLocation {
    type Error = ConfigError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<StoreLocation> for String {
    fn from(location: StoreLocation) -> Self {
        location.to_string()
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub interval_secs: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

impl AggregationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Kubernetes ConfigMaps; locations name `<namespace>/<configmap>`.
    ConfigMap,
    /// JSON files under `root`; locations map to `<root>/<namespace>/<name>.json`.
    Directory { root: PathBuf },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::ConfigMap
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogSourceConfig {
    pub name: String,
    pub location: StoreLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    pub location: StoreLocation,
    #[serde(default = "default_report_key")]
    pub key: String,
}

fn default_report_key() -> String {
    "report".to_string()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            location: StoreLocation::new(DEFAULT_NAMESPACE, "uptally-report"),
            key: default_report_key(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExporterKind {
    Store,
    Stdout,
}

impl ExporterKind {
    pub fn name(self) -> &'static str {
        match self {
            ExporterKind::Store => "store",
            ExporterKind::Stdout => "stdout",
        }
    }
}

impl fmt::Display for ExporterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UptallyConfig {
    pub aggregation: AggregationConfig,
    pub store: StoreConfig,
    pub event_logs: Vec<EventLogSourceConfig>,
    pub report: ReportConfig,
    pub exporters: Vec<ExporterKind>,
}

impl Default for UptallyConfig {
    fn default() -> Self {
        Self {
            aggregation: AggregationConfig::default(),
            store: StoreConfig::default(),
            event_logs: vec![
                EventLogSourceConfig {
                    name: "jobsets".to_string(),
                    location: StoreLocation::new(DEFAULT_NAMESPACE, "uptally-jobset-events"),
                },
                EventLogSourceConfig {
                    name: "nodes".to_string(),
                    location: StoreLocation::new(DEFAULT_NAMESPACE, "uptally-jobset-node-events"),
                },
            ],
            report: ReportConfig::default(),
            exporters: vec![ExporterKind::Store, ExporterKind::Stdout],
        }
    }
}

impl UptallyConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("invalid config at {}", path.display()))
    }

    /// Like [`Self::load_from_path`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_path(path)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw).context("failed to parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aggregation.interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.event_logs.is_empty() {
            return Err(ConfigError::NoEventLogs);
        }
        let mut names = BTreeSet::new();
        for source in &self.event_logs {
            if source.name.is_empty() || source.name.contains('/') {
                return Err(ConfigError::SourceName(source.name.clone()));
            }
            if !names.insert(source.name.as_str()) {
                return Err(ConfigError::DuplicateSource(source.name.clone()));
            }
        }
        let mut exporters = BTreeSet::new();
        for exporter in &self.exporters {
            if !exporters.insert(*exporter) {
                return Err(ConfigError::DuplicateExporter(*exporter));
            }
        }
        if self.report.key.is_empty() {
            return Err(ConfigError::EmptyReportKey);
        }
        Ok(())
    }

    pub fn exporter_enabled(&self, kind: ExporterKind) -> bool {
        self.exporters.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = UptallyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.aggregation.interval(), Duration::from_secs(10));
        assert!(config.exporter_enabled(ExporterKind::Store));
        assert_eq!(config.report.location.to_string(), "uptally-system/uptally-report");
    }

    #[test]
    fn parses_full_yaml() {
        let raw = r#"
aggregation:
  interval_secs: 30
store:
  kind: directory
  root: /var/lib/uptally
event_logs:
  - name: jobsets
    location: monitoring/jobset-events
report:
  location: monitoring/report
exporters: [stdout]
"#;
        let config = UptallyConfig::from_yaml(raw).expect("parse");
        assert_eq!(config.aggregation.interval_secs, 30);
        assert_eq!(
            config.store,
            StoreConfig::Directory {
                root: PathBuf::from("/var/lib/uptally")
            }
        );
        assert_eq!(config.event_logs.len(), 1);
        assert_eq!(
            config.event_logs[0].location,
            StoreLocation::new("monitoring", "jobset-events")
        );
        assert_eq!(config.report.key, "report");
        assert_eq!(config.exporters, vec![ExporterKind::Stdout]);
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = UptallyConfig::from_yaml("{}").expect("parse");
        assert_eq!(config.event_logs.len(), 2);
        assert_eq!(config.store, StoreConfig::ConfigMap);
    }

    #[test]
    fn rejects_malformed_location() {
        let raw = "report:\n  location: no-namespace\n";
        assert!(UptallyConfig::from_yaml(raw).is_err());
        assert_eq!(
            "a/b/c".parse::<StoreLocation>(),
            Err(ConfigError::Location("a/b/c".to_string()))
        );
    }

    #[test]
    fn rejects_unknown_exporter() {
        assert!(UptallyConfig::from_yaml("exporters: [pagerduty]\n").is_err());
    }

    #[test]
    fn validation_errors() {
        let mut config = UptallyConfig::default();
        config.aggregation.interval_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroInterval));

        let mut config = UptallyConfig::default();
        config.event_logs[1].name = "jobsets".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateSource("jobsets".to_string()))
        );

        let mut config = UptallyConfig::default();
        config.exporters.push(ExporterKind::Stdout);
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateExporter(ExporterKind::Stdout))
        );

        let mut config = UptallyConfig::default();
        config.event_logs.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoEventLogs));
    }

    #[test]
    fn loads_from_file_or_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        assert_eq!(
            UptallyConfig::load_or_default(&path).unwrap().event_logs.len(),
            2
        );

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "aggregation:\n  interval_secs: 5").unwrap();
        let config = UptallyConfig::load_from_path(&path).unwrap();
        assert_eq!(config.aggregation.interval_secs, 5);
    }
}
