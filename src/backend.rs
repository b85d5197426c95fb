use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use uptally_adapter_export::{StdoutExporter, StoreExporter};
use uptally_adapter_store::{ConfigMapStore, DirectoryStore};
use uptally_application::{Aggregator, AggregatorConfig, ExporterRegistry};
use uptally_domain::{ExporterKind, StoreConfig, UptallyConfig};
use uptally_ports::ObjectStore;

/// Resolved configuration plus the store it points at.
pub struct Backend {
    pub config: Arc<UptallyConfig>,
    pub config_path: PathBuf,
    store: Arc<dyn ObjectStore>,
}

impl Backend {
    pub async fn from_path(config_path: PathBuf) -> Result<Self> {
        if !config_path.exists() {
            info!(
                path = %config_path.display(),
                "config file not found, using defaults"
            );
        }
        let config = UptallyConfig::load_or_default(&config_path)?;
        let store = connect_store(&config.store).await?;
        Ok(Self::with_store(config, config_path, store))
    }

    pub fn with_store(
        config: UptallyConfig,
        config_path: PathBuf,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            store,
        }
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }

    pub fn exporters(&self) -> Result<ExporterRegistry> {
        let mut registry = ExporterRegistry::new();
        for kind in &self.config.exporters {
            match kind {
                ExporterKind::Store => registry.register(
                    kind.name(),
                    Arc::new(StoreExporter::new(
                        self.store(),
                        self.config.report.location.clone(),
                        self.config.report.key.clone(),
                    )),
                )?,
                ExporterKind::Stdout => {
                    registry.register(kind.name(), Arc::new(StdoutExporter::new()))?
                }
            }
        }
        Ok(registry)
    }

    pub fn aggregator(&self) -> Result<Aggregator> {
        Aggregator::new(
            AggregatorConfig::from(self.config.as_ref()),
            self.store(),
            self.exporters()?,
        )
        .context("failed to build aggregator")
    }
}

async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn ObjectStore>> {
    match config {
        StoreConfig::ConfigMap => {
            let store = ConfigMapStore::try_default().await?;
            Ok(Arc::new(store))
        }
        StoreConfig::Directory { root } => Ok(Arc::new(DirectoryStore::new(root.clone()))),
    }
}

/// Explicit path first, then `$HOME/.uptally/config.yaml`, then the working
/// directory.
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }

    if let Ok(home) = env::var("HOME") {
        return Path::new(&home).join(".uptally").join("config.yaml");
    }

    PathBuf::from("uptally-config.yaml")
}
