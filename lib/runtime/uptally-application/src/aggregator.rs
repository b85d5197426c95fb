use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use arc_swap::ArcSwap;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use uptally_domain::{
    EntityId, EventLog, Report, StoreLocation, Summary, UptallyConfig, summarize,
};
use uptally_ports::{Clock, ObjectStore, SystemClock};

use crate::exporters::ExporterRegistry;

/// One named event-log input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLogSource {
    pub name: String,
    pub location: StoreLocation,
}

impl EventLogSource {
    pub fn new(name: impl Into<String>, location: StoreLocation) -> Self {
        Self {
            name: name.into(),
            location,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub interval: Duration,
    pub sources: Vec<EventLogSource>,
}

impl From<&UptallyConfig> for AggregatorConfig {
    fn from(config: &UptallyConfig) -> Self {
        Self {
            interval: config.aggregation.interval(),
            sources: config
                .event_logs
                .iter()
                .map(|source| EventLogSource::new(source.name.clone(), source.location.clone()))
                .collect(),
        }
    }
}

/// Outcome counters for one aggregation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub entities: usize,
    pub skipped_entities: usize,
    pub failed_sources: usize,
    pub failed_exporters: usize,
}

/// Periodically rebuilds the availability report and fans it out.
///
/// The current report lives behind an [`ArcSwap`], so readers always get a
/// complete snapshot without waiting on an in-flight pass. Readiness flips to
/// true after the first report is published and never goes back.
pub struct Aggregator {
    interval: Duration,
    sources: Vec<EventLogSource>,
    store: Arc<dyn ObjectStore>,
    exporters: ExporterRegistry,
    clock: Arc<dyn Clock>,
    report: ArcSwap<Report>,
    ready: AtomicBool,
}

impl Aggregator {
    pub fn new(
        config: AggregatorConfig,
        store: Arc<dyn ObjectStore>,
        exporters: ExporterRegistry,
    ) -> Result<Self> {
        Self::with_clock(config, store, exporters, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: AggregatorConfig,
        store: Arc<dyn ObjectStore>,
        exporters: ExporterRegistry,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if config.interval.is_zero() {
            bail!("aggregation interval must be greater than zero");
        }
        if config.sources.is_empty() {
            bail!("aggregator needs at least one event log source");
        }
        let report = ArcSwap::from_pointee(Report::pending(clock.now()));
        Ok(Self {
            interval: config.interval,
            sources: config.sources,
            store,
            exporters,
            clock,
            report,
            ready: AtomicBool::new(false),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_report_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Latest published report, or the pending placeholder before the first.
    pub fn report(&self) -> Arc<Report> {
        self.report.load_full()
    }

    /// Runs passes on the configured interval until `cancel` fires.
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            sources = self.sources.len(),
            exporters = ?self.exporters.names(),
            "aggregator loop starting"
        );
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.aggregate(&cancel).await;
        }
        info!("aggregator loop exiting");
        Ok(())
    }

    /// Runs one pass: read every source, publish the report, run exporters.
    ///
    /// Returns `None` when nothing was published, either because the pass
    /// was cancelled before publishing or because no source could be read.
    pub async fn aggregate(&self, cancel: &CancellationToken) -> Option<PassStats> {
        let mut stats = PassStats::default();
        let now = self.clock.now();
        let mut summaries = BTreeMap::new();

        for source in &self.sources {
            let entries = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("aggregation pass cancelled while reading sources");
                    return None;
                }
                entries = self.store.read(&source.location) => entries,
            };
            let entries = match entries {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        source = %source.name,
                        location = %source.location,
                        error = %e,
                        "failed to read event logs, skipping source"
                    );
                    stats.failed_sources += 1;
                    continue;
                }
            };
            summarize_source(source, &entries, now, &mut summaries, &mut stats);
        }

        if stats.failed_sources == self.sources.len() {
            warn!("no event log source could be read; keeping previous report");
            return None;
        }

        stats.entities = summaries.len();
        let report = Arc::new(Report::new(now, summaries));
        self.report.store(Arc::clone(&report));
        if !self.ready.swap(true, Ordering::AcqRel) {
            info!(entities = stats.entities, "first report published, aggregator ready");
        }

        for (name, exporter) in self.exporters.iter() {
            if cancel.is_cancelled() {
                debug!(exporter = name, "skipping exporter after cancellation");
                break;
            }
            if let Err(e) = exporter.export(&report).await {
                warn!(exporter = name, error = %e, "report export failed");
                stats.failed_exporters += 1;
            }
        }

        info!(
            entities = stats.entities,
            skipped_entities = stats.skipped_entities,
            failed_sources = stats.failed_sources,
            failed_exporters = stats.failed_exporters,
            "aggregation pass complete"
        );
        Some(stats)
    }
}

fn summarize_source(
    source: &EventLogSource,
    entries: &BTreeMap<String, String>,
    now: chrono::DateTime<chrono::Utc>,
    summaries: &mut BTreeMap<EntityId, Summary>,
    stats: &mut PassStats,
) {
    for (key, raw) in entries {
        match EventLog::from_json(raw) {
            Ok(log) => {
                summaries.insert(EntityId::new(&source.name, key), summarize(&log, now));
            }
            Err(e) => {
                warn!(
                    source = %source.name,
                    entity = %key,
                    error = %e,
                    "skipping unreadable event log"
                );
                stats.skipped_entities += 1;
            }
        }
    }
}
