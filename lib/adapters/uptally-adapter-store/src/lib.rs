//! Object store adapters for event logs and published reports.

pub mod configmap;
pub mod directory;

pub use configmap::ConfigMapStore;
pub use directory::DirectoryStore;
