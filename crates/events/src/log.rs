//! Append-only movement log.
//!
//! The log never edits or removes entries. Reads go through [`MovementLog::query`],
//! which yields matches newest first.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use parque_core::{ActorId, MaterialId};

use crate::movement::{MovementAction, MovementEvent, NewMovement};

/// Filter criteria for log queries. `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub actor: Option<ActorId>,
    pub material: Option<MaterialId>,
    pub action: Option<MovementAction>,
}

impl MovementFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn by_material(mut self, material: MaterialId) -> Self {
        self.material = Some(material);
        self
    }

    pub fn by_action(mut self, action: MovementAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn matches(&self, event: &MovementEvent) -> bool {
        self.actor.as_ref().is_none_or(|a| *a == event.actor)
            && self.material.is_none_or(|m| m == event.material_id)
            && self.action.is_none_or(|a| a == event.action)
    }
}

/// In-memory view of the movement log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementLog {
    events: Vec<MovementEvent>,
}

impl MovementLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate from persisted entries (kept in stored order).
    pub fn from_events(events: Vec<MovementEvent>) -> Self {
        Self { events }
    }

    /// Store a movement, assigning the next sequence number.
    ///
    /// `movement.material` must be non-empty. The actor is non-empty by type; the
    /// material name is guaranteed by the ledger, which produces every movement
    /// from a record whose name passed validation.
    ///
    /// No deduplication: appending the same movement twice yields two entries.
    pub fn append(&mut self, movement: NewMovement) -> &MovementEvent {
        debug_assert!(
            !movement.material.trim().is_empty(),
            "movement without a material name"
        );
        let sequence = self.next_sequence();
        self.events.push(MovementEvent::from_new(sequence, movement));
        &self.events[self.events.len() - 1]
    }

    pub fn next_sequence(&self) -> u64 {
        self.events.last().map(|e| e.sequence).unwrap_or(0) + 1
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Entries in append order.
    pub fn events(&self) -> &[MovementEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<MovementEvent> {
        self.events
    }

    /// Events matching `filter`, newest first (ties broken by sequence, newest first).
    ///
    /// Ordering is resolved up front; matching happens lazily as the iterator is
    /// consumed.
    pub fn query(&self, filter: MovementFilter) -> impl Iterator<Item = &MovementEvent> + '_ {
        let mut ordered: Vec<&MovementEvent> = self.events.iter().collect();
        ordered.sort_by(|a, b| newest_first(a, b));
        ordered.into_iter().filter(move |e| filter.matches(e))
    }

    /// Owning variant of [`MovementLog::query`].
    pub fn into_query(self, filter: MovementFilter) -> impl Iterator<Item = MovementEvent> {
        let mut ordered = self.events;
        ordered.sort_by(newest_first);
        ordered.into_iter().filter(move |e| filter.matches(e))
    }

    /// Every movement of one material in the order it happened, across renames.
    pub fn history(&self, material: MaterialId) -> impl Iterator<Item = &MovementEvent> + '_ {
        self.events.iter().filter(move |e| e.material_id == material)
    }

    /// Distinct actors present in the log, sorted.
    pub fn actors(&self) -> Vec<ActorId> {
        self.events
            .iter()
            .map(|e| e.actor.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn newest_first(a: &MovementEvent, b: &MovementEvent) -> Ordering {
    b.occurred_at
        .cmp(&a.occurred_at)
        .then_with(|| b.sequence.cmp(&a.sequence))
}
