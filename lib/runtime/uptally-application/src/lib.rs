//! Aggregation runtime: the report loop and its exporter fan-out.

pub mod aggregator;
pub mod exporters;

pub use aggregator::{Aggregator, AggregatorConfig, EventLogSource, PassStats};
pub use exporters::ExporterRegistry;
