use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use uptally_domain::{Report, StoreLocation};
use uptally_ports::{Exporter, ObjectStore};

/// Writes the whole report as JSON under one well-known key.
#[derive(Clone)]
pub struct StoreExporter {
    store: Arc<dyn ObjectStore>,
    location: StoreLocation,
    key: String,
}

impl StoreExporter {
    pub fn new(store: Arc<dyn ObjectStore>, location: StoreLocation, key: impl Into<String>) -> Self {
        Self {
            store,
            location,
            key: key.into(),
        }
    }
}

#[async_trait]
impl Exporter for StoreExporter {
    async fn export(&self, report: &Report) -> Result<()> {
        let encoded = serde_json::to_string(report).context("failed to encode report")?;
        debug!(
            location = %self.location,
            key = %self.key,
            bytes = encoded.len(),
            "writing report"
        );
        self.store
            .write(&self.location, &self.key, encoded)
            .await
            .with_context(|| format!("failed to write report to {}", self.location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use uptally_domain::{EntityId, Summary};
    use uptally_ports::InMemoryObjectStore;

    fn report(entities: usize) -> Report {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let summaries: BTreeMap<_, _> = (0..entities)
            .map(|i| (EntityId::new("nodes", &format!("node-{i}")), Summary::default()))
            .collect();
        Report::new(now, summaries)
    }

    #[tokio::test]
    async fn overwrites_previous_report() {
        let store = InMemoryObjectStore::new();
        let location = StoreLocation::new("uptally-system", "uptally-report");
        let exporter = StoreExporter::new(Arc::new(store.clone()), location.clone(), "report");

        exporter.export(&report(3)).await.unwrap();
        exporter.export(&report(1)).await.unwrap();

        let raw = store.get(&location, "report").expect("report written");
        let stored: Report = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, report(1));
    }

    #[tokio::test]
    async fn surfaces_store_errors() {
        let location = StoreLocation::new("uptally-system", "uptally-report");
        let exporter = StoreExporter::new(Arc::new(FailingStore), location, "report");
        assert!(exporter.export(&report(1)).await.is_err());
    }

    struct FailingStore;

    #[async_trait]
    impl ObjectStore for FailingStore {
        async fn read(&self, _location: &StoreLocation) -> Result<BTreeMap<String, String>> {
            anyhow::bail!("forbidden")
        }

        async fn write(&self, _location: &StoreLocation, _key: &str, _value: String) -> Result<()> {
            anyhow::bail!("forbidden")
        }
    }
}
