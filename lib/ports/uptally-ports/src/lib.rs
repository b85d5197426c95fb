//! Port traits the aggregator depends on, plus in-process implementations.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use uptally_domain::{Report, StoreLocation};

/// Keyed object store holding event logs and published reports.
///
/// Each location is one object with string entries, like a ConfigMap's
/// `data` field.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns every entry at `location`. A missing object reads as empty.
    async fn read(&self, location: &StoreLocation) -> Result<BTreeMap<String, String>>;

    /// Overwrites one entry, creating the object when it does not exist.
    async fn write(&self, location: &StoreLocation, key: &str, value: String) -> Result<()>;
}

/// Publishes a report somewhere. Each call fully replaces the previous one.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, report: &Report) -> Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    objects: Arc<Mutex<BTreeMap<StoreLocation, BTreeMap<String, String>>>>,
    unreadable: Arc<Mutex<BTreeSet<StoreLocation>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, location: &StoreLocation, key: &str, value: impl Into<String>) {
        if let Ok(mut guard) = self.objects.lock() {
            guard
                .entry(location.clone())
                .or_default()
                .insert(key.to_string(), value.into());
        }
    }

    pub fn remove(&self, location: &StoreLocation, key: &str) {
        if let Ok(mut guard) = self.objects.lock() {
            if let Some(object) = guard.get_mut(location) {
                object.remove(key);
            }
        }
    }

    pub fn get(&self, location: &StoreLocation, key: &str) -> Option<String> {
        self.objects
            .lock()
            .ok()
            .and_then(|guard| guard.get(location).and_then(|object| object.get(key).cloned()))
    }

    /// Makes reads of `location` fail until [`Self::heal`] is called.
    pub fn break_location(&self, location: &StoreLocation) {
        if let Ok(mut guard) = self.unreadable.lock() {
            guard.insert(location.clone());
        }
    }

    pub fn heal(&self, location: &StoreLocation) {
        if let Ok(mut guard) = self.unreadable.lock() {
            guard.remove(location);
        }
    }

    fn is_broken(&self, location: &StoreLocation) -> bool {
        self.unreadable
            .lock()
            .map(|guard| guard.contains(location))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn read(&self, location: &StoreLocation) -> Result<BTreeMap<String, String>> {
        if self.is_broken(location) {
            return Err(anyhow!("object {location} is unreadable"));
        }
        let guard = self
            .objects
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(guard.get(location).cloned().unwrap_or_default())
    }

    async fn write(&self, location: &StoreLocation, key: &str, value: String) -> Result<()> {
        let mut guard = self
            .objects
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        guard
            .entry(location.clone())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// Exporter that keeps every report it receives.
#[derive(Clone, Default)]
pub struct InMemoryExporter {
    reports: Arc<Mutex<Vec<Report>>>,
}

impl InMemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<Report> {
        self.reports
            .lock()
            .ok()
            .and_then(|guard| guard.last().cloned())
    }
}

#[async_trait]
impl Exporter for InMemoryExporter {
    async fn export(&self, report: &Report) -> Result<()> {
        let mut guard = self
            .reports
            .lock()
            .map_err(|_| anyhow!("in-memory exporter lock poisoned"))?;
        guard.push(report.clone());
        Ok(())
    }
}

#[derive(Clone, Copy, Default)]
pub struct NullExporter;

#[async_trait]
impl Exporter for NullExporter {
    async fn export(&self, _report: &Report) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn in_memory_store_round_trips_entries() {
        let store = InMemoryObjectStore::new();
        let location = StoreLocation::new("ns", "events");
        assert!(store.read(&location).await.unwrap().is_empty());

        store.write(&location, "a", "1".to_string()).await.unwrap();
        store.insert(&location, "b", "2");
        let entries = store.read(&location).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(store.get(&location, "a").as_deref(), Some("1"));

        store.remove(&location, "a");
        assert_eq!(store.get(&location, "a"), None);
    }

    #[tokio::test]
    async fn broken_location_fails_reads_until_healed() {
        let store = InMemoryObjectStore::new();
        let location = StoreLocation::new("ns", "events");
        store.break_location(&location);
        assert!(store.read(&location).await.is_err());
        store.heal(&location);
        assert!(store.read(&location).await.is_ok());
    }

    #[test]
    fn manual_clock_moves_on_demand() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(clock.now(), start + chrono::Duration::minutes(5));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[tokio::test]
    async fn in_memory_exporter_records_reports() {
        let exporter = InMemoryExporter::new();
        let report = Report::pending(Utc::now());
        exporter.export(&report).await.unwrap();
        assert_eq!(exporter.reports().len(), 1);
        assert_eq!(exporter.last(), Some(report));
    }
}
