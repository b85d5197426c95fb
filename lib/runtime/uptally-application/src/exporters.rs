use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Result, bail};

use uptally_ports::Exporter;

/// Named set of exporters, iterated in name order.
#[derive(Clone, Default)]
pub struct ExporterRegistry {
    exporters: BTreeMap<String, Arc<dyn Exporter>>,
}

impl ExporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, exporter: Arc<dyn Exporter>) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            bail!("exporter name is required");
        }
        if self.exporters.contains_key(&name) {
            bail!("exporter `{name}` is already registered");
        }
        self.exporters.insert(name, exporter);
        Ok(())
    }

    pub fn with(mut self, name: impl Into<String>, exporter: Arc<dyn Exporter>) -> Result<Self> {
        self.register(name, exporter)?;
        Ok(self)
    }

    pub fn names(&self) -> Vec<&str> {
        self.exporters.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.exporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exporters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Exporter>)> {
        self.exporters
            .iter()
            .map(|(name, exporter)| (name.as_str(), exporter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uptally_ports::NullExporter;

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = ExporterRegistry::new();
        registry.register("stdout", Arc::new(NullExporter)).unwrap();
        assert!(registry.register("stdout", Arc::new(NullExporter)).is_err());
        assert!(registry.register("", Arc::new(NullExporter)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn iterates_in_name_order() {
        let registry = ExporterRegistry::new()
            .with("stdout", Arc::new(NullExporter))
            .and_then(|r| r.with("configmap", Arc::new(NullExporter)))
            .unwrap();
        assert_eq!(registry.names(), vec!["configmap", "stdout"]);
        assert_eq!(registry.iter().count(), 2);
    }
}
