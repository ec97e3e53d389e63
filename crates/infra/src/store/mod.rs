//! Persistence boundary for the catalog and the movement log.
//!
//! Both collections are loaded in full and replaced in full; there is no partial
//! or incremental write. `commit` replaces them together.

pub mod in_memory;
pub mod json_file;
pub mod schema;
pub mod r#trait;

pub use in_memory::InMemoryInventoryStore;
pub use json_file::JsonFileStore;
pub use r#trait::{InventoryStore, StoreError};
