//! Inventory unit of work (application-level orchestration).
//!
//! Every mutating call runs the same pipeline under one process-wide lock:
//!
//! ```text
//! request (actor, material, quantity, note)
//!   ↓
//! 1. Load catalog + log from the store
//!   ↓
//! 2. Ledger decides (pure; rejects without touching anything)
//!   ↓
//! 3. Apply to the staged catalog, append to the staged log
//!   ↓
//! 4. Commit both through `InventoryStore::commit` (all or nothing)
//! ```
//!
//! Reads take the same lock so they never observe a commit halfway through.

use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, info, warn};

use parque_core::{ActorId, Aggregate, Clock, MaterialId, SystemClock};
use parque_events::{Event, MovementEvent, MovementFilter, MovementLog};
use parque_inventory::{
    AddMaterial, Checkout, Ledger, LedgerCommand, LedgerError, LedgerSnapshot, MarkInoperative,
    MarkOperational, MaterialRef, MaterialView, MovementContext, RenameMaterial, ReturnItem,
    ReviseTotal,
};

use crate::store::{InventoryStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Whether the failure is something the caller asked for and can fix
    /// (as opposed to broken storage or corrupt data).
    pub fn is_user_error(&self) -> bool {
        match self {
            ServiceError::Ledger(LedgerError::InvariantViolation(_)) => false,
            ServiceError::Ledger(_) => true,
            ServiceError::Store(_) => false,
        }
    }
}

/// Parameters of a new catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMaterial {
    pub name: String,
    pub category: Option<String>,
    pub total_quantity: i64,
    pub unit: Option<String>,
}

impl NewMaterial {
    pub fn new(name: impl Into<String>, total_quantity: i64) -> Self {
        Self {
            name: name.into(),
            category: None,
            total_quantity,
            unit: None,
        }
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Ledger + movement log over a store, serialized by a single lock.
pub struct InventoryService<S, C = SystemClock> {
    store: S,
    clock: C,
    lock: Mutex<()>,
}

impl<S> InventoryService<S, SystemClock>
where
    S: InventoryStore,
{
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S, C> InventoryService<S, C>
where
    S: InventoryStore,
    C: Clock,
{
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>, ServiceError> {
        self.lock
            .lock()
            .map_err(|_| ServiceError::Store(StoreError::LockPoisoned))
    }

    fn load_ledger(&self) -> Result<Ledger, ServiceError> {
        let records = self.store.load_materials()?;
        debug!(materials = records.len(), "loaded catalog");
        Ok(Ledger::from_records(records)?)
    }

    /// Run one command through the full pipeline and return the touched material.
    fn run(
        &self,
        actor: &ActorId,
        note: Option<&str>,
        build: impl FnOnce(MovementContext) -> LedgerCommand,
    ) -> Result<MaterialView, ServiceError> {
        let _guard = self.guard()?;

        let context = MovementContext::new(actor.clone(), self.clock.now())
            .with_note(note.map(str::to_string));
        let command = build(context);

        let mut ledger = self.load_ledger()?;
        let events = match ledger.execute(&command) {
            Ok(events) => events,
            Err(err) => {
                warn!(actor = %actor, error = %err, "movement rejected");
                return Err(err.into());
            }
        };

        let mut log = MovementLog::from_events(self.store.load_events()?);
        let mut appended = Vec::with_capacity(events.len());
        for event in &events {
            let movement = ledger.movement_for(event)?;
            appended.push(log.append(movement).clone());
        }

        self.store.commit(ledger.records(), log.events())?;

        for movement in &appended {
            info!(
                event_type = movement.event_type(),
                sequence = movement.sequence,
                actor = %movement.actor,
                material = %movement.material,
                material_id = %movement.material_id,
                action = %movement.action,
                quantity = movement.quantity,
                "movement recorded"
            );
        }

        let material_id = events
            .last()
            .map(|e| e.material_id())
            .ok_or_else(|| LedgerError::invariant("command produced no event"))?;
        ledger
            .get(material_id)
            .map(MaterialView::from)
            .ok_or_else(|| LedgerError::unknown(material_id).into())
    }

    /// Issue `quantity` units from the depot.
    pub fn checkout(
        &self,
        actor: &ActorId,
        material: &MaterialRef,
        quantity: i64,
        note: Option<&str>,
    ) -> Result<MaterialView, ServiceError> {
        self.run(actor, note, |context| {
            LedgerCommand::Checkout(Checkout {
                context,
                material: material.clone(),
                quantity,
            })
        })
    }

    /// Take `quantity` checked-out units back into the depot.
    pub fn return_item(
        &self,
        actor: &ActorId,
        material: &MaterialRef,
        quantity: i64,
        note: Option<&str>,
    ) -> Result<MaterialView, ServiceError> {
        self.run(actor, note, |context| {
            LedgerCommand::ReturnItem(ReturnItem {
                context,
                material: material.clone(),
                quantity,
            })
        })
    }

    pub fn mark_inoperative(
        &self,
        actor: &ActorId,
        material: &MaterialRef,
        quantity: i64,
        also_remove_from_depot: bool,
        note: Option<&str>,
    ) -> Result<MaterialView, ServiceError> {
        self.run(actor, note, |context| {
            LedgerCommand::MarkInoperative(MarkInoperative {
                context,
                material: material.clone(),
                quantity,
                also_remove_from_depot,
            })
        })
    }

    pub fn mark_operational(
        &self,
        actor: &ActorId,
        material: &MaterialRef,
        quantity: i64,
        note: Option<&str>,
    ) -> Result<MaterialView, ServiceError> {
        self.run(actor, note, |context| {
            LedgerCommand::MarkOperational(MarkOperational {
                context,
                material: material.clone(),
                quantity,
            })
        })
    }

    pub fn add_material(
        &self,
        actor: &ActorId,
        material: NewMaterial,
        note: Option<&str>,
    ) -> Result<MaterialView, ServiceError> {
        self.run(actor, note, |context| {
            LedgerCommand::AddMaterial(AddMaterial {
                context,
                material_id: MaterialId::new(),
                name: material.name,
                category: material.category,
                total_quantity: material.total_quantity,
                unit: material.unit,
            })
        })
    }

    pub fn revise_total(
        &self,
        actor: &ActorId,
        material: &MaterialRef,
        new_total: i64,
        note: Option<&str>,
    ) -> Result<MaterialView, ServiceError> {
        self.run(actor, note, |context| {
            LedgerCommand::ReviseTotal(ReviseTotal {
                context,
                material: material.clone(),
                new_total,
            })
        })
    }

    pub fn rename_material(
        &self,
        actor: &ActorId,
        material: &MaterialRef,
        new_name: &str,
        note: Option<&str>,
    ) -> Result<MaterialView, ServiceError> {
        self.run(actor, note, |context| {
            LedgerCommand::RenameMaterial(RenameMaterial {
                context,
                material: material.clone(),
                new_name: new_name.to_string(),
            })
        })
    }

    /// Current catalog state.
    pub fn snapshot(&self) -> Result<LedgerSnapshot, ServiceError> {
        let _guard = self.guard()?;
        Ok(self.load_ledger()?.snapshot())
    }

    pub fn material(&self, reference: &MaterialRef) -> Result<MaterialView, ServiceError> {
        let _guard = self.guard()?;
        Ok(MaterialView::from(self.load_ledger()?.resolve(reference)?))
    }

    /// Movements matching `filter`, newest first.
    ///
    /// Each call re-reads the log; the returned iterator filters lazily.
    pub fn query(
        &self,
        filter: MovementFilter,
    ) -> Result<impl Iterator<Item = MovementEvent>, ServiceError> {
        let _guard = self.guard()?;
        let log = MovementLog::from_events(self.store.load_events()?);
        Ok(log.into_query(filter))
    }

    /// Every movement of one material, oldest first, across renames.
    pub fn history(&self, material: &MaterialRef) -> Result<Vec<MovementEvent>, ServiceError> {
        let _guard = self.guard()?;
        let id = self.load_ledger()?.resolve(material)?.id;
        let log = MovementLog::from_events(self.store.load_events()?);
        Ok(log.history(id).cloned().collect())
    }

    /// Distinct actors present in the log.
    pub fn actors(&self) -> Result<Vec<ActorId>, ServiceError> {
        let _guard = self.guard()?;
        Ok(MovementLog::from_events(self.store.load_events()?).actors())
    }
}
