//! Availability tracking for batch workloads and the nodes they run on.
//!
//! Wires the domain, runtime and adapter crates together from a
//! [`UptallyConfig`](uptally_domain::UptallyConfig).

pub mod backend;

pub use backend::{Backend, config_path};
pub use uptally_application::{Aggregator, ExporterRegistry, PassStats};
pub use uptally_domain::{EventLog, EventRecord, Report, Summary, UptallyConfig, summarize};
