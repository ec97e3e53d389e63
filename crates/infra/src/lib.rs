//! Infrastructure layer: storage, configuration and the inventory unit of work.

pub mod config;
pub mod service;
pub mod store;


pub use config::{ConfigError, StoreConfig};
pub use service::{InventoryService, NewMaterial, ServiceError};
pub use store::{InMemoryInventoryStore, InventoryStore, JsonFileStore, StoreError};
