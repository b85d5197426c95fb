use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;

use uptally_domain::StoreLocation;
use uptally_ports::ObjectStore;

/// Keeps each location as a JSON object file at `<root>/<namespace>/<name>.json`.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, location: &StoreLocation) -> PathBuf {
        self.root
            .join(&location.namespace)
            .join(format!("{}.json", location.name))
    }
}

#[async_trait]
impl ObjectStore for DirectoryStore {
    async fn read(&self, location: &StoreLocation) -> Result<BTreeMap<String, String>> {
        let path = self.path_for(location);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        serde_json::from_str(&raw).with_context(|| format!("invalid object at {}", path.display()))
    }

    async fn write(&self, location: &StoreLocation, key: &str, value: String) -> Result<()> {
        let path = self.path_for(location);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut entries = self.read(location).await?;
        entries.insert(key.to_string(), value);
        let encoded = serde_json::to_vec_pretty(&entries)?;

        // Rename over the old file so readers never see a partial write.
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, encoded)
            .await
            .with_context(|| format!("failed to write {}", staging.display()))?;
        fs::rename(&staging, &path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }
}
