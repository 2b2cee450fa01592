pub mod catalog;
pub mod rotation;

pub use catalog::{load_catalog, StyleCatalog};
pub use rotation::{JsonFileQueueStore, MemoryQueueStore, StyleRotation};
