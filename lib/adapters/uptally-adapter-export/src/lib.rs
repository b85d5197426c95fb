//! Report exporters.

pub mod stdout;
pub mod store;

pub use stdout::StdoutExporter;
pub use store::StoreExporter;
