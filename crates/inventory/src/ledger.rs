use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parque_core::{ActorId, Aggregate, Entity, EventId, MaterialId, Quantity};
use parque_events::{Event, MovementAction, NewMovement};

use crate::error::LedgerError;
use crate::material::{MaterialRecord, MaterialRef, normalize_category, normalize_unit};
use crate::snapshot::{LedgerSnapshot, MaterialView};

/// Who did it, when, and why. Carried by every command and event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementContext {
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl MovementContext {
    pub fn new(actor: ActorId, occurred_at: DateTime<Utc>) -> Self {
        Self {
            actor,
            occurred_at,
            note: None,
        }
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self
    }
}

/// Command: Checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub context: MovementContext,
    pub material: MaterialRef,
    pub quantity: i64,
}

/// Command: ReturnItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnItem {
    pub context: MovementContext,
    pub material: MaterialRef,
    pub quantity: i64,
}

/// Command: MarkInoperative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkInoperative {
    pub context: MovementContext,
    pub material: MaterialRef,
    pub quantity: i64,
    pub also_remove_from_depot: bool,
}

/// Command: MarkOperational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkOperational {
    pub context: MovementContext,
    pub material: MaterialRef,
    pub quantity: i64,
}

/// Command: AddMaterial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMaterial {
    pub context: MovementContext,
    pub material_id: MaterialId,
    pub name: String,
    pub category: Option<String>,
    pub total_quantity: i64,
    pub unit: Option<String>,
}

/// Command: ReviseTotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseTotal {
    pub context: MovementContext,
    pub material: MaterialRef,
    pub new_total: i64,
}

/// Command: RenameMaterial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameMaterial {
    pub context: MovementContext,
    pub material: MaterialRef,
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    Checkout(Checkout),
    ReturnItem(ReturnItem),
    MarkInoperative(MarkInoperative),
    MarkOperational(MarkOperational),
    AddMaterial(AddMaterial),
    ReviseTotal(ReviseTotal),
    RenameMaterial(RenameMaterial),
}

/// Event: MaterialCheckedOut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialCheckedOut {
    pub context: MovementContext,
    pub material_id: MaterialId,
    pub quantity: u32,
}

/// Event: MaterialReturned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialReturned {
    pub context: MovementContext,
    pub material_id: MaterialId,
    pub quantity: u32,
}

/// Event: MaterialMarkedInoperative.
///
/// `removed_from_depot` is what actually happened, not what was requested: the
/// removal is skipped when the depot holds fewer than `quantity` units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialMarkedInoperative {
    pub context: MovementContext,
    pub material_id: MaterialId,
    pub quantity: u32,
    pub removed_from_depot: bool,
}

/// Event: MaterialMarkedOperational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialMarkedOperational {
    pub context: MovementContext,
    pub material_id: MaterialId,
    pub quantity: u32,
    /// Previously withdrawn units that went back into the depot.
    pub restored_to_depot: u32,
}

/// Event: MaterialAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialAdded {
    pub context: MovementContext,
    pub material_id: MaterialId,
    pub category: String,
    pub name: String,
    pub total_quantity: u32,
    pub unit: String,
}

/// Event: TotalRevised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalRevised {
    pub context: MovementContext,
    pub material_id: MaterialId,
    pub previous_total: u32,
    pub new_total: u32,
}

/// Event: MaterialRenamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRenamed {
    pub context: MovementContext,
    pub material_id: MaterialId,
    pub previous_name: String,
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    MaterialCheckedOut(MaterialCheckedOut),
    MaterialReturned(MaterialReturned),
    MaterialMarkedInoperative(MaterialMarkedInoperative),
    MaterialMarkedOperational(MaterialMarkedOperational),
    MaterialAdded(MaterialAdded),
    TotalRevised(TotalRevised),
    MaterialRenamed(MaterialRenamed),
}

impl LedgerEvent {
    pub fn context(&self) -> &MovementContext {
        match self {
            LedgerEvent::MaterialCheckedOut(e) => &e.context,
            LedgerEvent::MaterialReturned(e) => &e.context,
            LedgerEvent::MaterialMarkedInoperative(e) => &e.context,
            LedgerEvent::MaterialMarkedOperational(e) => &e.context,
            LedgerEvent::MaterialAdded(e) => &e.context,
            LedgerEvent::TotalRevised(e) => &e.context,
            LedgerEvent::MaterialRenamed(e) => &e.context,
        }
    }

    pub fn material_id(&self) -> MaterialId {
        match self {
            LedgerEvent::MaterialCheckedOut(e) => e.material_id,
            LedgerEvent::MaterialReturned(e) => e.material_id,
            LedgerEvent::MaterialMarkedInoperative(e) => e.material_id,
            LedgerEvent::MaterialMarkedOperational(e) => e.material_id,
            LedgerEvent::MaterialAdded(e) => e.material_id,
            LedgerEvent::TotalRevised(e) => e.material_id,
            LedgerEvent::MaterialRenamed(e) => e.material_id,
        }
    }

    pub fn action(&self) -> MovementAction {
        match self {
            LedgerEvent::MaterialCheckedOut(_) => MovementAction::Checkout,
            LedgerEvent::MaterialReturned(_) => MovementAction::Return,
            LedgerEvent::MaterialMarkedInoperative(_) => MovementAction::MarkInoperative,
            LedgerEvent::MaterialMarkedOperational(_) => MovementAction::MarkOperational,
            LedgerEvent::MaterialAdded(_) => MovementAction::AddMaterial,
            LedgerEvent::TotalRevised(_) => MovementAction::ReviseTotal,
            LedgerEvent::MaterialRenamed(_) => MovementAction::RenameMaterial,
        }
    }

    /// Note recorded when the caller left none.
    fn default_note(&self) -> Option<String> {
        match self {
            LedgerEvent::MaterialAdded(_) => Some("new material added".to_string()),
            LedgerEvent::TotalRevised(e) => Some(format!(
                "total changed (before {}, now {})",
                e.previous_total, e.new_total
            )),
            LedgerEvent::MaterialRenamed(e) => Some(format!("renamed from '{}'", e.previous_name)),
            LedgerEvent::MaterialMarkedInoperative(e) if e.removed_from_depot => {
                Some("removed from depot".to_string())
            }
            _ => None,
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::MaterialCheckedOut(_) => "parque.material.checked_out",
            LedgerEvent::MaterialReturned(_) => "parque.material.returned",
            LedgerEvent::MaterialMarkedInoperative(_) => "parque.material.marked_inoperative",
            LedgerEvent::MaterialMarkedOperational(_) => "parque.material.marked_operational",
            LedgerEvent::MaterialAdded(_) => "parque.material.added",
            LedgerEvent::TotalRevised(_) => "parque.material.total_revised",
            LedgerEvent::MaterialRenamed(_) => "parque.material.renamed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.context().occurred_at
    }
}

/// Aggregate root: the whole catalog.
///
/// Names are unique within a category; ids are unique across the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    records: Vec<MaterialRecord>,
    version: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate from persisted records, rejecting data that breaks invariants.
    pub fn from_records(records: Vec<MaterialRecord>) -> Result<Self, LedgerError> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for r in &records {
            r.check_invariants()?;
            if !ids.insert(*r.id()) {
                return Err(LedgerError::invariant(format!("duplicate material id {}", r.id())));
            }
            if !names.insert((r.category.as_str(), r.name.as_str())) {
                return Err(LedgerError::DuplicateMaterial {
                    category: r.category.clone(),
                    name: r.name.clone(),
                });
            }
        }
        Ok(Self { records, version: 0 })
    }

    pub fn records(&self) -> &[MaterialRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<MaterialRecord> {
        self.records
    }

    pub fn get(&self, id: MaterialId) -> Option<&MaterialRecord> {
        self.records.iter().find(|r| *r.id() == id)
    }

    fn get_mut(&mut self, id: MaterialId) -> Option<&mut MaterialRecord> {
        self.records.iter_mut().find(|r| *r.id() == id)
    }

    /// Resolve a reference to exactly one record.
    pub fn resolve(&self, reference: &MaterialRef) -> Result<&MaterialRecord, LedgerError> {
        match reference {
            MaterialRef::Id(id) => self.get(*id).ok_or_else(|| LedgerError::unknown(id)),
            MaterialRef::Name { category, name } => {
                let mut matches = self
                    .records
                    .iter()
                    .filter(|r| r.is_named(category.as_deref(), name));
                match (matches.next(), matches.next()) {
                    (Some(r), None) => Ok(r),
                    (None, _) => Err(LedgerError::unknown(reference)),
                    (Some(_), Some(_)) => Err(LedgerError::UnknownMaterial(format!(
                        "{reference} is ambiguous; qualify it with a category"
                    ))),
                }
            }
        }
    }

    /// Read-only copy of every record, in catalog order.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            materials: self.records.iter().map(MaterialView::from).collect(),
        }
    }

    /// Build the log entry for an event that has already been applied.
    ///
    /// Display names are taken from the current record, so a rename is logged
    /// under its new name.
    pub fn movement_for(&self, event: &LedgerEvent) -> Result<NewMovement, LedgerError> {
        let record = self
            .get(event.material_id())
            .ok_or_else(|| LedgerError::unknown(event.material_id()))?;
        let quantity = match event {
            LedgerEvent::MaterialCheckedOut(e) => e.quantity,
            LedgerEvent::MaterialReturned(e) => e.quantity,
            LedgerEvent::MaterialMarkedInoperative(e) => e.quantity,
            LedgerEvent::MaterialMarkedOperational(e) => e.quantity,
            LedgerEvent::MaterialAdded(e) => e.total_quantity,
            LedgerEvent::TotalRevised(e) => e.new_total,
            LedgerEvent::MaterialRenamed(_) => record.total_quantity,
        };
        let context = event.context();
        Ok(NewMovement {
            event_id: EventId::new(),
            actor: context.actor.clone(),
            material_id: record.id,
            category: record.category.clone(),
            material: record.name.clone(),
            quantity,
            action: event.action(),
            occurred_at: context.occurred_at,
            note: context.note.clone().or_else(|| event.default_note()),
        })
    }

    fn ensure_unique_name(
        &self,
        category: &str,
        name: &str,
        except: Option<MaterialId>,
    ) -> Result<(), LedgerError> {
        let taken = self
            .records
            .iter()
            .any(|r| Some(r.id) != except && r.category == category && r.name == name);
        if taken {
            return Err(LedgerError::DuplicateMaterial {
                category: category.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn handle_checkout(&self, cmd: &Checkout) -> Result<Vec<LedgerEvent>, LedgerError> {
        let quantity = movement_quantity(cmd.quantity)?;
        let record = self.resolve(&cmd.material)?;
        if record.in_depot < quantity {
            return Err(LedgerError::InsufficientStock {
                material: record.name.clone(),
                requested: quantity,
                available: record.in_depot,
            });
        }
        Ok(vec![LedgerEvent::MaterialCheckedOut(MaterialCheckedOut {
            context: cmd.context.clone(),
            material_id: record.id,
            quantity,
        })])
    }

    fn handle_return(&self, cmd: &ReturnItem) -> Result<Vec<LedgerEvent>, LedgerError> {
        let quantity = movement_quantity(cmd.quantity)?;
        let record = self.resolve(&cmd.material)?;
        if record.checked_out < quantity {
            return Err(LedgerError::InsufficientStock {
                material: record.name.clone(),
                requested: quantity,
                available: record.checked_out,
            });
        }
        Ok(vec![LedgerEvent::MaterialReturned(MaterialReturned {
            context: cmd.context.clone(),
            material_id: record.id,
            quantity,
        })])
    }

    fn handle_mark_inoperative(
        &self,
        cmd: &MarkInoperative,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let quantity = movement_quantity(cmd.quantity)?;
        let record = self.resolve(&cmd.material)?;
        if record.operational < quantity {
            return Err(LedgerError::InsufficientOperationalStock {
                material: record.name.clone(),
                requested: quantity,
                available: record.operational,
            });
        }
        Ok(vec![LedgerEvent::MaterialMarkedInoperative(
            MaterialMarkedInoperative {
                context: cmd.context.clone(),
                material_id: record.id,
                quantity,
                removed_from_depot: cmd.also_remove_from_depot && record.in_depot >= quantity,
            },
        )])
    }

    fn handle_mark_operational(
        &self,
        cmd: &MarkOperational,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let quantity = movement_quantity(cmd.quantity)?;
        let record = self.resolve(&cmd.material)?;
        let broken = record.non_operational();
        if broken < quantity {
            return Err(LedgerError::InsufficientNonOperationalStock {
                material: record.name.clone(),
                requested: quantity,
                available: broken,
            });
        }
        Ok(vec![LedgerEvent::MaterialMarkedOperational(
            MaterialMarkedOperational {
                context: cmd.context.clone(),
                material_id: record.id,
                quantity,
                restored_to_depot: record.withdrawn.min(quantity),
            },
        )])
    }

    fn handle_add(&self, cmd: &AddMaterial) -> Result<Vec<LedgerEvent>, LedgerError> {
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidName("name cannot be empty".to_string()));
        }
        let category = normalize_category(cmd.category.as_deref());
        self.ensure_unique_name(&category, name, None)?;
        if self.get(cmd.material_id).is_some() {
            return Err(LedgerError::invariant(format!(
                "material id {} already in use",
                cmd.material_id
            )));
        }
        let total_quantity = movement_quantity(cmd.total_quantity)?;

        Ok(vec![LedgerEvent::MaterialAdded(MaterialAdded {
            context: cmd.context.clone(),
            material_id: cmd.material_id,
            category,
            name: name.to_string(),
            total_quantity,
            unit: normalize_unit(cmd.unit.as_deref()),
        })])
    }

    fn handle_revise(&self, cmd: &ReviseTotal) -> Result<Vec<LedgerEvent>, LedgerError> {
        let new_total = u32::try_from(cmd.new_total).map_err(|_| {
            LedgerError::InvalidQuantity(format!(
                "total must be between 0 and {} (got {})",
                u32::MAX,
                cmd.new_total
            ))
        })?;
        let record = self.resolve(&cmd.material)?;
        let committed = record.committed();
        if new_total < committed {
            return Err(LedgerError::TotalBelowCommitted {
                material: record.name.clone(),
                requested: new_total,
                committed,
            });
        }
        Ok(vec![LedgerEvent::TotalRevised(TotalRevised {
            context: cmd.context.clone(),
            material_id: record.id,
            previous_total: record.total_quantity,
            new_total,
        })])
    }

    fn handle_rename(&self, cmd: &RenameMaterial) -> Result<Vec<LedgerEvent>, LedgerError> {
        let new_name = cmd.new_name.trim();
        if new_name.is_empty() {
            return Err(LedgerError::InvalidName("name cannot be empty".to_string()));
        }
        let record = self.resolve(&cmd.material)?;
        self.ensure_unique_name(&record.category, new_name, Some(record.id))?;
        Ok(vec![LedgerEvent::MaterialRenamed(MaterialRenamed {
            context: cmd.context.clone(),
            material_id: record.id,
            previous_name: record.name.clone(),
            new_name: new_name.to_string(),
        })])
    }

    fn execute_one(&mut self, command: LedgerCommand) -> Result<LedgerEvent, LedgerError> {
        let mut events = self.execute(&command)?;
        events
            .pop()
            .ok_or_else(|| LedgerError::invariant("command produced no event"))
    }

    pub fn checkout(
        &mut self,
        context: MovementContext,
        material: MaterialRef,
        quantity: i64,
    ) -> Result<LedgerEvent, LedgerError> {
        self.execute_one(LedgerCommand::Checkout(Checkout {
            context,
            material,
            quantity,
        }))
    }

    pub fn return_item(
        &mut self,
        context: MovementContext,
        material: MaterialRef,
        quantity: i64,
    ) -> Result<LedgerEvent, LedgerError> {
        self.execute_one(LedgerCommand::ReturnItem(ReturnItem {
            context,
            material,
            quantity,
        }))
    }

    pub fn mark_inoperative(
        &mut self,
        context: MovementContext,
        material: MaterialRef,
        quantity: i64,
        also_remove_from_depot: bool,
    ) -> Result<LedgerEvent, LedgerError> {
        self.execute_one(LedgerCommand::MarkInoperative(MarkInoperative {
            context,
            material,
            quantity,
            also_remove_from_depot,
        }))
    }

    pub fn mark_operational(
        &mut self,
        context: MovementContext,
        material: MaterialRef,
        quantity: i64,
    ) -> Result<LedgerEvent, LedgerError> {
        self.execute_one(LedgerCommand::MarkOperational(MarkOperational {
            context,
            material,
            quantity,
        }))
    }

    pub fn add_material(
        &mut self,
        context: MovementContext,
        name: &str,
        category: Option<&str>,
        total_quantity: i64,
        unit: Option<&str>,
    ) -> Result<LedgerEvent, LedgerError> {
        self.execute_one(LedgerCommand::AddMaterial(AddMaterial {
            context,
            material_id: MaterialId::new(),
            name: name.to_string(),
            category: category.map(str::to_string),
            total_quantity,
            unit: unit.map(str::to_string),
        }))
    }

    pub fn revise_total(
        &mut self,
        context: MovementContext,
        material: MaterialRef,
        new_total: i64,
    ) -> Result<LedgerEvent, LedgerError> {
        self.execute_one(LedgerCommand::ReviseTotal(ReviseTotal {
            context,
            material,
            new_total,
        }))
    }

    pub fn rename_material(
        &mut self,
        context: MovementContext,
        material: MaterialRef,
        new_name: &str,
    ) -> Result<LedgerEvent, LedgerError> {
        self.execute_one(LedgerCommand::RenameMaterial(RenameMaterial {
            context,
            material,
            new_name: new_name.to_string(),
        }))
    }
}

fn movement_quantity(raw: i64) -> Result<u32, LedgerError> {
    Quantity::new(raw)
        .map(Quantity::get)
        .map_err(|e| LedgerError::InvalidQuantity(e.to_string()))
}

impl Aggregate for Ledger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = LedgerError;

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::MaterialAdded(e) => {
                self.records.push(MaterialRecord::new(
                    e.material_id,
                    Some(&e.category),
                    &e.name,
                    e.total_quantity,
                    Some(&e.unit),
                ));
            }
            LedgerEvent::MaterialCheckedOut(e) => {
                if let Some(r) = self.get_mut(e.material_id) {
                    r.in_depot = r.in_depot.saturating_sub(e.quantity);
                    r.checked_out += e.quantity;
                }
            }
            LedgerEvent::MaterialReturned(e) => {
                if let Some(r) = self.get_mut(e.material_id) {
                    r.checked_out = r.checked_out.saturating_sub(e.quantity);
                    r.in_depot += e.quantity;
                }
            }
            LedgerEvent::MaterialMarkedInoperative(e) => {
                if let Some(r) = self.get_mut(e.material_id) {
                    r.operational = r.operational.saturating_sub(e.quantity);
                    if e.removed_from_depot {
                        r.in_depot = r.in_depot.saturating_sub(e.quantity);
                        r.withdrawn += e.quantity;
                    }
                }
            }
            LedgerEvent::MaterialMarkedOperational(e) => {
                if let Some(r) = self.get_mut(e.material_id) {
                    r.operational = (r.operational + e.quantity).min(r.total_quantity);
                    r.withdrawn = r.withdrawn.saturating_sub(e.restored_to_depot);
                    r.in_depot += e.restored_to_depot;
                }
            }
            LedgerEvent::TotalRevised(e) => {
                if let Some(r) = self.get_mut(e.material_id) {
                    if e.new_total >= r.total_quantity {
                        r.operational += e.new_total - r.total_quantity;
                    } else {
                        // Shrinking drops non-operational units first; withdrawn units
                        // stay non-operational.
                        r.operational = r
                            .operational
                            .min(e.new_total.saturating_sub(r.withdrawn));
                    }
                    r.total_quantity = e.new_total;
                    r.in_depot = e.new_total.saturating_sub(r.committed());
                }
            }
            LedgerEvent::MaterialRenamed(e) => {
                if let Some(r) = self.get_mut(e.material_id) {
                    r.name = e.new_name.clone();
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::Checkout(cmd) => self.handle_checkout(cmd),
            LedgerCommand::ReturnItem(cmd) => self.handle_return(cmd),
            LedgerCommand::MarkInoperative(cmd) => self.handle_mark_inoperative(cmd),
            LedgerCommand::MarkOperational(cmd) => self.handle_mark_operational(cmd),
            LedgerCommand::AddMaterial(cmd) => self.handle_add(cmd),
            LedgerCommand::ReviseTotal(cmd) => self.handle_revise(cmd),
            LedgerCommand::RenameMaterial(cmd) => self.handle_rename(cmd),
        }
    }
}
