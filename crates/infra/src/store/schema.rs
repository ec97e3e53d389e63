//! Versioned on-disk documents and the upgrade path between versions.
//!
//! Version history:
//! - **1**: bare JSON arrays with the depot's legacy Spanish column names
//!   (`material`, `cantidad_total`, `en_parque`, `fuera_parque`, `unidad`, optional
//!   `categoria` / `operativos`; log rows `usuario`, `material`, `cantidad`, `accion`,
//!   `hora`, `observacion`). No ids, no withdrawn bucket. `hora` is the writing
//!   host's local wall-clock time with no offset recorded; it is kept as-is and
//!   read as UTC, so upgraded timestamps can be shifted by that host's offset.
//!   Ordering within the upgraded log is unaffected.
//! - **2**: `{ "schema_version": 2, "records": [...] }` holding `MaterialRecord` /
//!   `MovementEvent` as serialized by this workspace.
//!
//! Upgrades run once, when the store is opened.

use std::collections::HashMap;

use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use parque_core::{ActorId, EventId, MaterialId};
use parque_events::{MovementAction, MovementEvent};
use parque_inventory::{DEFAULT_CATEGORY, MaterialRecord};

use super::r#trait::StoreError;

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

const LEGACY_SCHEMA_VERSION: u32 = 1;
const LEGACY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A versioned collection as written to disk.
#[derive(Debug, Serialize)]
pub struct Document<'a, T> {
    pub schema_version: u32,
    pub records: &'a [T],
}

impl<'a, T> Document<'a, T> {
    pub fn current(records: &'a [T]) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            records,
        }
    }
}

/// A document read from disk whose version has been identified but not yet decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub version: u32,
    pub records: JsonValue,
}

impl RawDocument {
    /// Identify the version of a parsed file.
    pub fn identify(file: &str, value: JsonValue) -> Result<Self, StoreError> {
        match value {
            JsonValue::Array(_) => Ok(Self {
                version: LEGACY_SCHEMA_VERSION,
                records: value,
            }),
            JsonValue::Object(mut map) => {
                let version = map
                    .get("schema_version")
                    .and_then(JsonValue::as_u64)
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| StoreError::corrupt(file, "missing schema_version"))?;
                let records = map
                    .remove("records")
                    .ok_or_else(|| StoreError::corrupt(file, "missing records"))?;
                if version > CURRENT_SCHEMA_VERSION {
                    return Err(StoreError::UnsupportedSchema {
                        file: file.to_string(),
                        found: version,
                        supported: CURRENT_SCHEMA_VERSION,
                    });
                }
                Ok(Self { version, records })
            }
            _ => Err(StoreError::corrupt(file, "expected an array or an object")),
        }
    }

    /// An empty collection at the current version.
    pub fn empty() -> Self {
        Self {
            version: CURRENT_SCHEMA_VERSION,
            records: JsonValue::Array(Vec::new()),
        }
    }

    pub fn is_current(&self) -> bool {
        self.version == CURRENT_SCHEMA_VERSION
    }
}

#[derive(Debug, Deserialize)]
struct LegacyMaterial {
    material: String,
    cantidad_total: u32,
    en_parque: u32,
    fuera_parque: u32,
    #[serde(default)]
    unidad: Option<String>,
    #[serde(default)]
    categoria: Option<String>,
    #[serde(default)]
    operativos: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct LegacyMovement {
    usuario: String,
    material: String,
    cantidad: u32,
    accion: String,
    hora: String,
    #[serde(default)]
    observacion: Option<String>,
    #[serde(default)]
    categoria: Option<String>,
}

/// Decode materials and movements at any supported version into current records.
///
/// Movements are decoded after materials because legacy rows only name their
/// material; they are joined to the upgraded catalog by (category, name).
pub fn decode(
    materials_file: &str,
    materials: RawDocument,
    events_file: &str,
    events: RawDocument,
) -> Result<(Vec<MaterialRecord>, Vec<MovementEvent>), StoreError> {
    let materials = match materials.version {
        CURRENT_SCHEMA_VERSION => decode_records(materials_file, materials.records)?,
        _ => upgrade_materials(materials_file, materials.records)?,
    };
    let events = match events.version {
        CURRENT_SCHEMA_VERSION => decode_records(events_file, events.records)?,
        _ => upgrade_events(events_file, events.records, &materials)?,
    };
    Ok((materials, events))
}

pub(crate) fn decode_records<T: serde::de::DeserializeOwned>(
    file: &str,
    records: JsonValue,
) -> Result<Vec<T>, StoreError> {
    serde_json::from_value(records).map_err(|e| StoreError::Serialization {
        what: file.to_string(),
        message: e.to_string(),
    })
}

fn upgrade_materials(file: &str, records: JsonValue) -> Result<Vec<MaterialRecord>, StoreError> {
    let legacy: Vec<LegacyMaterial> = decode_records(file, records)?;
    let upgraded = legacy
        .into_iter()
        .map(|row| {
            let mut record = MaterialRecord::new(
                MaterialId::new(),
                row.categoria.as_deref(),
                &row.material,
                row.cantidad_total,
                row.unidad.as_deref(),
            );
            let located = row.en_parque.saturating_add(row.fuera_parque);
            record.in_depot = row.en_parque;
            record.checked_out = row.fuera_parque;
            if located > row.cantidad_total {
                // Old total edits could shrink the total below what was out.
                tracing::warn!(
                    material = %record.name,
                    total = row.cantidad_total,
                    located,
                    "legacy total below located units; raising total"
                );
                record.total_quantity = located;
            }
            record.withdrawn = record.total_quantity - located;
            // Units missing from both columns were pulled as inoperative.
            record.operational = row
                .operativos
                .unwrap_or(record.total_quantity)
                .min(record.total_quantity - record.withdrawn);
            record
        })
        .collect::<Vec<_>>();
    tracing::debug!(file, count = upgraded.len(), "upgraded legacy materials");
    Ok(upgraded)
}

fn legacy_action(accion: &str, observacion: Option<&str>) -> Option<MovementAction> {
    match accion.trim() {
        "Sacar" => Some(MovementAction::Checkout),
        "Devolver" => Some(MovementAction::Return),
        "Inoperativo" | "Marcar inoperativo" => Some(MovementAction::MarkInoperative),
        "Operativo" | "Marcar operativo" => Some(MovementAction::MarkOperational),
        "Editar inventario" => {
            if observacion.is_some_and(|o| o.starts_with("Añadido")) {
                Some(MovementAction::AddMaterial)
            } else {
                Some(MovementAction::ReviseTotal)
            }
        }
        other => other.parse().ok(),
    }
}

fn upgrade_events(
    file: &str,
    records: JsonValue,
    materials: &[MaterialRecord],
) -> Result<Vec<MovementEvent>, StoreError> {
    let legacy: Vec<LegacyMovement> = decode_records(file, records)?;
    let mut ids: HashMap<(String, String), MaterialId> = materials
        .iter()
        .map(|m| ((m.category.clone(), m.name.clone()), m.id))
        .collect();

    let mut upgraded = Vec::with_capacity(legacy.len());
    for (idx, row) in legacy.into_iter().enumerate() {
        let row_no = idx + 1;
        let action = legacy_action(&row.accion, row.observacion.as_deref()).ok_or_else(|| {
            StoreError::corrupt(file, format!("row {row_no}: unknown action '{}'", row.accion))
        })?;
        let actor = ActorId::new(row.usuario)
            .map_err(|e| StoreError::corrupt(file, format!("row {row_no}: {e}")))?;
        let naive = NaiveDateTime::parse_from_str(row.hora.trim(), LEGACY_TIME_FORMAT)
            .map_err(|e| StoreError::corrupt(file, format!("row {row_no}: bad time '{}': {e}", row.hora)))?;
        let category = row
            .categoria
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
        let name = row.material.trim().to_string();

        // Rows naming a material that no longer exists still get one stable id per name.
        let material_id = *ids
            .entry((category.clone(), name.clone()))
            .or_insert_with(MaterialId::new);

        upgraded.push(MovementEvent {
            event_id: EventId::new(),
            sequence: row_no as u64,
            actor,
            material_id,
            category,
            material: name,
            quantity: row.cantidad,
            action,
            // Offset unknown: the local wall-clock value is kept as UTC.
            occurred_at: Utc.from_utc_datetime(&naive),
            note: row.observacion.filter(|o| !o.trim().is_empty()),
        });
    }
    tracing::debug!(file, count = upgraded.len(), "upgraded legacy movements");
    Ok(upgraded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifies_versions() {
        let legacy = RawDocument::identify("m", json!([])).unwrap();
        assert_eq!(legacy.version, 1);
        assert!(!legacy.is_current());

        let current = RawDocument::identify("m", json!({"schema_version": 2, "records": []})).unwrap();
        assert!(current.is_current());

        let err = RawDocument::identify("m", json!({"schema_version": 9, "records": []})).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedSchema { found: 9, supported: 2, .. }));

        assert!(RawDocument::identify("m", json!("nope")).is_err());
        assert!(RawDocument::identify("m", json!({"records": []})).is_err());
    }

    #[test]
    fn legacy_rows_upgrade_and_join_by_name() {
        let materials = RawDocument::identify(
            "materials.json",
            json!([
                {"material": "Pala inglesa", "cantidad_total": 10, "en_parque": 7, "fuera_parque": 3, "unidad": "uds"},
                {"material": "Almádena", "cantidad_total": 4, "en_parque": 2, "fuera_parque": 0, "unidad": "uds", "operativos": 2},
            ]),
        )
        .unwrap();
        let events = RawDocument::identify(
            "movements.json",
            json!([
                {"usuario": "parquista", "material": "Pala inglesa", "cantidad": 3, "accion": "Sacar", "hora": "2024-05-01 08:30:00", "observacion": ""},
                {"usuario": "teniente", "material": "Almádena", "cantidad": 4, "accion": "Editar inventario", "hora": "2024-05-01 09:00:00", "observacion": "Añadido material nuevo"},
                {"usuario": "teniente", "material": "Pico viejo", "cantidad": 1, "accion": "Devolver", "hora": "2024-05-02 09:00:00"},
            ]),
        )
        .unwrap();

        let (materials, events) = decode("materials.json", materials, "movements.json", events).unwrap();

        let pala = &materials[0];
        assert_eq!(pala.category, DEFAULT_CATEGORY);
        assert_eq!((pala.in_depot, pala.checked_out, pala.withdrawn, pala.operational), (7, 3, 0, 10));
        pala.check_invariants().unwrap();

        // Two units vanished from the depot when they were marked inoperative.
        let almadena = &materials[1];
        assert_eq!((almadena.in_depot, almadena.withdrawn, almadena.operational), (2, 2, 2));
        almadena.check_invariants().unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].material_id, pala.id);
        assert_eq!(events[0].action, MovementAction::Checkout);
        assert_eq!(events[0].note, None);
        assert_eq!(events[1].action, MovementAction::AddMaterial);
        assert_eq!(events[1].material_id, almadena.id);
        assert_eq!(events[2].action, MovementAction::Return);
        assert!(materials.iter().all(|m| m.id != events[2].material_id));
        assert_eq!(
            events.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(events[0].occurred_at.to_rfc3339(), "2024-05-01T08:30:00+00:00");
    }

    #[test]
    fn legacy_total_below_located_units_is_raised() {
        let materials = RawDocument::identify(
            "materials.json",
            json!([{"material": "Pala", "cantidad_total": 2, "en_parque": 0, "fuera_parque": 5}]),
        )
        .unwrap();
        let events = RawDocument::identify("movements.json", json!([])).unwrap();
        let (materials, _) = decode("materials.json", materials, "movements.json", events).unwrap();
        assert_eq!(materials[0].total_quantity, 5);
        materials[0].check_invariants().unwrap();
    }

    #[test]
    fn legacy_missing_units_are_not_counted_operational() {
        let materials = RawDocument::identify(
            "materials.json",
            json!([
                {"material": "Pala", "cantidad_total": 10, "en_parque": 7, "fuera_parque": 1},
                {"material": "Pico", "cantidad_total": 6, "en_parque": 3, "fuera_parque": 0, "operativos": 5},
            ]),
        )
        .unwrap();
        let events = RawDocument::identify("movements.json", json!([])).unwrap();
        let (materials, _) = decode("materials.json", materials, "movements.json", events).unwrap();

        let pala = &materials[0];
        assert_eq!((pala.withdrawn, pala.operational, pala.non_operational()), (2, 8, 2));
        let pico = &materials[1];
        assert_eq!((pico.withdrawn, pico.operational), (3, 3));
        for m in &materials {
            m.check_invariants().unwrap();
        }
    }

    #[test]
    fn legacy_times_are_read_as_utc_wall_clock() {
        let materials = RawDocument::identify("materials.json", json!([])).unwrap();
        let events = RawDocument::identify(
            "movements.json",
            json!([{"usuario": "x", "material": "y", "cantidad": 1, "accion": "Sacar", "hora": "2024-05-01 23:59:59"}]),
        )
        .unwrap();
        let (_, events) = decode("materials.json", materials, "movements.json", events).unwrap();
        assert_eq!(events[0].occurred_at.to_rfc3339(), "2024-05-01T23:59:59+00:00");
    }

    #[test]
    fn unknown_legacy_action_is_corrupt() {
        let materials = RawDocument::identify("materials.json", json!([])).unwrap();
        let events = RawDocument::identify(
            "movements.json",
            json!([{"usuario": "x", "material": "y", "cantidad": 1, "accion": "Robar", "hora": "2024-05-01 08:30:00"}]),
        )
        .unwrap();
        let err = decode("materials.json", materials, "movements.json", events).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { message, .. } if message.contains("Robar")));
    }
}
