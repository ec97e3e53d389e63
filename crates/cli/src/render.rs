//! Plain-text rendering of snapshots and movements.

use std::fmt::Write as _;

use parque_events::MovementEvent;
use parque_inventory::{LedgerSnapshot, MaterialView};

pub fn snapshot_table(snapshot: &LedgerSnapshot) -> String {
    let name_width = snapshot
        .materials
        .iter()
        .map(|m| m.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("MATERIAL".len());

    let mut out = String::new();
    for (category, materials) in snapshot.by_category() {
        let _ = writeln!(out, "[{category}]");
        let _ = writeln!(
            out,
            "  {:<name_width$}  {:>5}  {:>5}  {:>5}  {:>5}  {:>5}  UNIT",
            "MATERIAL", "TOTAL", "DEPOT", "OUT", "GONE", "BROKE"
        );
        for m in materials {
            let _ = writeln!(
                out,
                "  {:<name_width$}  {:>5}  {:>5}  {:>5}  {:>5}  {:>5}  {}",
                m.name,
                m.total_quantity,
                m.in_depot,
                m.checked_out,
                m.withdrawn,
                m.non_operational,
                m.unit
            );
        }
    }

    let totals = snapshot.totals();
    let _ = writeln!(
        out,
        "{} materials: {} in depot, {} checked out, {} withdrawn, {} not operational",
        totals.materials,
        totals.units_in_depot,
        totals.units_checked_out,
        totals.units_withdrawn,
        totals.units_non_operational
    );
    out
}

pub fn material_line(m: &MaterialView) -> String {
    format!(
        "{}/{}: total {}, in depot {}, checked out {}, operational {} {}",
        m.category, m.name, m.total_quantity, m.in_depot, m.checked_out, m.operational, m.unit
    )
}

pub fn movement_line(e: &MovementEvent) -> String {
    let mut line = format!(
        "#{:<5} {}  {:<16} {:<12} {}/{} x{}",
        e.sequence,
        e.occurred_at.format("%Y-%m-%d %H:%M:%S"),
        e.action.as_str(),
        e.actor.as_str(),
        e.category,
        e.material,
        e.quantity
    );
    if let Some(note) = &e.note {
        let _ = write!(line, "  ({note})");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use parque_core::{ActorId, EventId, MaterialId};
    use parque_events::MovementAction;
    use parque_inventory::{Ledger, MaterialRecord, default_catalog};

    #[test]
    fn table_groups_by_category_and_sums() {
        let mut records = default_catalog();
        records.push(MaterialRecord::new(
            MaterialId::new(),
            Some("protección"),
            "Casco",
            6,
            None,
        ));
        let snapshot = Ledger::from_records(records).unwrap().snapshot();

        let table = snapshot_table(&snapshot);
        assert!(table.contains("[protección]"));
        assert!(table.contains("[uncategorized]"));
        assert!(table.contains("Motosierra Stihl"));
        assert!(table.trim_end().ends_with(
            "6 materials: 45 in depot, 0 checked out, 0 withdrawn, 0 not operational"
        ));
    }

    #[test]
    fn movement_line_includes_note_when_present() {
        let mut event = MovementEvent {
            event_id: EventId::new(),
            sequence: 7,
            actor: ActorId::new("alice").unwrap(),
            material_id: MaterialId::new(),
            category: "uncategorized".to_string(),
            material: "Almádena".to_string(),
            quantity: 2,
            action: MovementAction::Checkout,
            occurred_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap(),
            note: None,
        };
        let line = movement_line(&event);
        assert!(line.starts_with("#7"));
        assert!(line.contains("2024-03-01 08:30:00"));
        assert!(line.ends_with("uncategorized/Almádena x2"));

        event.note = Some("obra norte".to_string());
        assert!(movement_line(&event).ends_with("x2  (obra norte)"));
    }
}
