use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::summary::Summary;

/// Identifies a tracked entity as `<source>/<key>`.
///
/// `source` is the name of the event-log input the entity came from
/// (for example `jobsets` or `nodes`); `key` is the entry key inside it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(source: &str, key: &str) -> Self {
        Self(format!("{source}/{key}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn source(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(source, _)| source)
    }

    pub fn key(&self) -> &str {
        self.0.split_once('/').map_or("", |(_, key)| key)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Point-in-time summaries of every tracked entity.
///
/// A report is built whole and never edited afterwards; the aggregator swaps
/// in a fresh one each pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub ready: bool,
    #[serde(default)]
    pub summaries: BTreeMap<EntityId, Summary>,
}

impl Report {
    /// Placeholder served before the first pass completes.
    pub fn pending(now: DateTime<Utc>) -> Self {
        Self {
            generated_at: now,
            ready: false,
            summaries: BTreeMap::new(),
        }
    }

    pub fn new(generated_at: DateTime<Utc>, summaries: BTreeMap<EntityId, Summary>) -> Self {
        Self {
            generated_at,
            ready: true,
            summaries,
        }
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    pub fn get(&self, id: &EntityId) -> Option<&Summary> {
        self.summaries.get(id)
    }

    /// Summaries belonging to one event-log source.
    pub fn for_source<'a>(
        &'a self,
        source: &'a str,
    ) -> impl Iterator<Item = (&'a EntityId, &'a Summary)> + 'a {
        self.summaries
            .iter()
            .filter(move |(id, _)| id.source() == source)
    }

    /// Entity counts per source, in source-name order.
    pub fn source_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for id in self.summaries.keys() {
            *counts.entry(id.source()).or_insert(0) += 1;
        }
        counts
    }
}
