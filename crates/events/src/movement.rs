use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use parque_core::{ActorId, EventId, MaterialId};

use crate::Event;

/// What a movement did. Closed set.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementAction {
    /// Units left the depot, issued to someone.
    Checkout,
    /// Checked-out units came back to the depot.
    Return,
    /// Units were declared not usable.
    MarkInoperative,
    /// Non-operational units were repaired.
    MarkOperational,
    /// A new material entered the catalog.
    AddMaterial,
    /// The nominal total of a material was revised.
    ReviseTotal,
    /// A material's display name changed.
    RenameMaterial,
}

impl MovementAction {
    pub const ALL: [MovementAction; 7] = [
        MovementAction::Checkout,
        MovementAction::Return,
        MovementAction::MarkInoperative,
        MovementAction::MarkOperational,
        MovementAction::AddMaterial,
        MovementAction::ReviseTotal,
        MovementAction::RenameMaterial,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MovementAction::Checkout => "checkout",
            MovementAction::Return => "return",
            MovementAction::MarkInoperative => "mark_inoperative",
            MovementAction::MarkOperational => "mark_operational",
            MovementAction::AddMaterial => "add_material",
            MovementAction::ReviseTotal => "revise_total",
            MovementAction::RenameMaterial => "rename_material",
        }
    }

    /// Administrative catalog edits, as opposed to physical movements.
    pub fn is_admin_edit(self) -> bool {
        matches!(
            self,
            MovementAction::AddMaterial | MovementAction::ReviseTotal | MovementAction::RenameMaterial
        )
    }
}

impl core::fmt::Display for MovementAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown movement action '{0}'")]
pub struct ParseActionError(pub String);

impl core::str::FromStr for MovementAction {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        MovementAction::ALL
            .into_iter()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| ParseActionError(s.to_string()))
    }
}

/// A movement ready to be appended (not yet assigned a log position).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub event_id: EventId,
    pub actor: ActorId,
    pub material_id: MaterialId,
    pub category: String,
    pub material: String,
    /// Units moved. For `ReviseTotal` this is the new total, which may be zero.
    pub quantity: u32,
    pub action: MovementAction,
    pub occurred_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// A movement stored in the log.
///
/// `category` and `material` are the display values at the time of the event;
/// `material_id` is what history is joined on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementEvent {
    pub event_id: EventId,
    /// 1-based position in the log.
    pub sequence: u64,
    pub actor: ActorId,
    pub material_id: MaterialId,
    pub category: String,
    pub material: String,
    pub quantity: u32,
    pub action: MovementAction,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl MovementEvent {
    pub(crate) fn from_new(sequence: u64, m: NewMovement) -> Self {
        Self {
            event_id: m.event_id,
            sequence,
            actor: m.actor,
            material_id: m.material_id,
            category: m.category,
            material: m.material,
            quantity: m.quantity,
            action: m.action,
            occurred_at: m.occurred_at,
            note: m.note,
        }
    }
}

impl Event for MovementEvent {
    fn event_type(&self) -> &'static str {
        match self.action {
            MovementAction::Checkout => "parque.material.checked_out",
            MovementAction::Return => "parque.material.returned",
            MovementAction::MarkInoperative => "parque.material.marked_inoperative",
            MovementAction::MarkOperational => "parque.material.marked_operational",
            MovementAction::AddMaterial => "parque.material.added",
            MovementAction::ReviseTotal => "parque.material.total_revised",
            MovementAction::RenameMaterial => "parque.material.renamed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn action_parses_loosely() {
        assert_eq!("checkout".parse::<MovementAction>().unwrap(), MovementAction::Checkout);
        assert_eq!(
            "Mark-Inoperative".parse::<MovementAction>().unwrap(),
            MovementAction::MarkInoperative
        );
        assert!("sacar".parse::<MovementAction>().is_err());
    }

    #[test]
    fn stored_movement_is_an_event() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let movement = MovementEvent::from_new(
            4,
            NewMovement {
                event_id: EventId::new(),
                actor: ActorId::new("alice").unwrap(),
                material_id: MaterialId::new(),
                category: "uncategorized".to_string(),
                material: "Shovel".to_string(),
                quantity: 2,
                action: MovementAction::MarkOperational,
                occurred_at: at,
                note: None,
            },
        );
        assert_eq!(movement.event_type(), "parque.material.marked_operational");
        assert_eq!(Event::occurred_at(&movement), at);
        assert_eq!(movement.version(), 1);
    }

    #[test]
    fn action_serializes_snake_case() {
        let json = serde_json::to_string(&MovementAction::ReviseTotal).unwrap();
        assert_eq!(json, "\"revise_total\"");
    }

    #[test]
    fn admin_edits_are_flagged() {
        assert!(MovementAction::AddMaterial.is_admin_edit());
        assert!(!MovementAction::Checkout.is_admin_edit());
    }
}
