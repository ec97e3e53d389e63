use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use parque_events::MovementEvent;
use parque_inventory::MaterialRecord;

/// Persistence failure.
///
/// These are **infrastructure errors** (IO, encoding, schema) as opposed to ledger
/// rule violations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed for {what}: {message}")]
    Serialization { what: String, message: String },

    #[error("{file} has schema version {found}; this build supports up to {supported}")]
    UnsupportedSchema {
        file: String,
        found: u32,
        supported: u32,
    },

    /// Stored data could not be interpreted (e.g. an unreadable legacy row).
    #[error("corrupt data in {file}: {message}")]
    Corrupt { file: String, message: String },

    #[error("lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            file: file.into(),
            message: message.into(),
        }
    }
}

/// Full-replace store for materials and movements.
///
/// ## Contract
///
/// - `load_*` return the collections in stored order (empty when nothing is stored)
/// - `save_*` replace the whole collection and are idempotent
/// - `commit` replaces both collections as one unit: either both writes are
///   visible afterwards or neither is
///
/// The default `commit` is built from the four primitives and restores the previous
/// catalog when the movement write fails. Implementations that can do better (one
/// lock, staged files) override it.
pub trait InventoryStore: Send + Sync {
    fn load_materials(&self) -> Result<Vec<MaterialRecord>, StoreError>;

    fn save_materials(&self, materials: &[MaterialRecord]) -> Result<(), StoreError>;

    fn load_events(&self) -> Result<Vec<MovementEvent>, StoreError>;

    fn save_events(&self, events: &[MovementEvent]) -> Result<(), StoreError>;

    fn commit(
        &self,
        materials: &[MaterialRecord],
        events: &[MovementEvent],
    ) -> Result<(), StoreError> {
        let previous = self.load_materials()?;
        self.save_materials(materials)?;
        if let Err(err) = self.save_events(events) {
            if let Err(rollback) = self.save_materials(&previous) {
                tracing::error!(error = %rollback, "failed to restore catalog after movement write failure");
            }
            return Err(err);
        }
        Ok(())
    }
}

impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    fn load_materials(&self) -> Result<Vec<MaterialRecord>, StoreError> {
        (**self).load_materials()
    }

    fn save_materials(&self, materials: &[MaterialRecord]) -> Result<(), StoreError> {
        (**self).save_materials(materials)
    }

    fn load_events(&self) -> Result<Vec<MovementEvent>, StoreError> {
        (**self).load_events()
    }

    fn save_events(&self, events: &[MovementEvent]) -> Result<(), StoreError> {
        (**self).save_events(events)
    }

    fn commit(
        &self,
        materials: &[MaterialRecord],
        events: &[MovementEvent],
    ) -> Result<(), StoreError> {
        (**self).commit(materials, events)
    }
}
