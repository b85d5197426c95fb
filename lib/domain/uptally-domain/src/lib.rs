//! Domain models and invariants.

pub mod config;
pub mod events;
pub mod report;
pub mod summary;

pub use config::{
    AggregationConfig, ConfigError, EventLogSourceConfig, ExporterKind, ReportConfig,
    StoreConfig, StoreLocation, UptallyConfig,
};
pub use events::{EventLog, EventLogError, EventRecord};
pub use report::{EntityId, Report};
pub use summary::{Summary, summarize};
