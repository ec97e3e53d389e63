use std::sync::RwLock;

use parque_events::MovementEvent;
use parque_inventory::MaterialRecord;

use super::r#trait::{InventoryStore, StoreError};

#[derive(Debug, Default)]
struct State {
    materials: Vec<MaterialRecord>,
    events: Vec<MovementEvent>,
}

/// In-memory store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    state: RwLock<State>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_materials(materials: Vec<MaterialRecord>) -> Self {
        Self {
            state: RwLock::new(State {
                materials,
                events: Vec::new(),
            }),
        }
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn load_materials(&self) -> Result<Vec<MaterialRecord>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.materials.clone())
    }

    fn save_materials(&self, materials: &[MaterialRecord]) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        state.materials = materials.to_vec();
        Ok(())
    }

    fn load_events(&self) -> Result<Vec<MovementEvent>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.events.clone())
    }

    fn save_events(&self, events: &[MovementEvent]) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        state.events = events.to_vec();
        Ok(())
    }

    fn commit(
        &self,
        materials: &[MaterialRecord],
        events: &[MovementEvent],
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        state.materials = materials.to_vec();
        state.events = events.to_vec();
        Ok(())
    }
}
