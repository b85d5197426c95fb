use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use tracing::debug;

use uptally_domain::StoreLocation;
use uptally_ports::ObjectStore;

/// Stores each location as a ConfigMap; entries live in its `data` field.
#[derive(Clone)]
pub struct ConfigMapStore {
    client: kube::Client,
}

impl ConfigMapStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    pub async fn try_default() -> Result<Self> {
        let client = kube::Client::try_default()
            .await
            .context("failed to create kubernetes client")?;
        Ok(Self::new(client))
    }

    fn api(&self, location: &StoreLocation) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &location.namespace)
    }
}

#[async_trait]
impl ObjectStore for ConfigMapStore {
    async fn read(&self, location: &StoreLocation) -> Result<BTreeMap<String, String>> {
        let config_map = self
            .api(location)
            .get_opt(&location.name)
            .await
            .with_context(|| format!("failed to get configmap {location}"))?;
        Ok(config_map.and_then(|cm| cm.data).unwrap_or_default())
    }

    async fn write(&self, location: &StoreLocation, key: &str, value: String) -> Result<()> {
        let api = self.api(location);
        let existing = api
            .get_opt(&location.name)
            .await
            .with_context(|| format!("failed to get configmap {location}"))?;
        let create = existing.is_none();
        let config_map = upsert_entry(existing, location, key, value);

        if create {
            debug!(location = %location, key, "creating configmap");
            api.create(&PostParams::default(), &config_map)
                .await
                .with_context(|| format!("failed to create configmap {location}"))?;
        } else {
            debug!(location = %location, key, "updating configmap");
            api.replace(&location.name, &PostParams::default(), &config_map)
                .await
                .with_context(|| format!("failed to update configmap {location}"))?;
        }
        Ok(())
    }
}

fn upsert_entry(
    existing: Option<ConfigMap>,
    location: &StoreLocation,
    key: &str,
    value: String,
) -> ConfigMap {
    let mut config_map = existing.unwrap_or_else(|| ConfigMap {
        metadata: ObjectMeta {
            name: Some(location.name.clone()),
            namespace: Some(location.namespace.clone()),
            ..ObjectMeta::default()
        },
        ..ConfigMap::default()
    });
    config_map
        .data
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value);
    config_map
}
