use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use parque_core::MaterialId;

use crate::material::MaterialRecord;

/// Read-only view of one material, with derived counts filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialView {
    pub id: MaterialId,
    pub category: String,
    pub name: String,
    pub total_quantity: u32,
    pub in_depot: u32,
    pub checked_out: u32,
    pub withdrawn: u32,
    pub operational: u32,
    pub non_operational: u32,
    pub unit: String,
}

impl From<&MaterialRecord> for MaterialView {
    fn from(r: &MaterialRecord) -> Self {
        Self {
            id: r.id,
            category: r.category.clone(),
            name: r.name.clone(),
            total_quantity: r.total_quantity,
            in_depot: r.in_depot,
            checked_out: r.checked_out,
            withdrawn: r.withdrawn,
            operational: r.operational,
            non_operational: r.non_operational(),
            unit: r.unit.clone(),
        }
    }
}

/// Headline numbers for the whole catalog.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTotals {
    pub materials: usize,
    pub units_in_depot: u64,
    pub units_checked_out: u64,
    pub units_withdrawn: u64,
    pub units_non_operational: u64,
}

/// Full catalog state at one point in time, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub materials: Vec<MaterialView>,
}

impl LedgerSnapshot {
    pub fn get(&self, category: &str, name: &str) -> Option<&MaterialView> {
        self.materials
            .iter()
            .find(|m| m.category == category && m.name == name)
    }

    pub fn by_id(&self, id: MaterialId) -> Option<&MaterialView> {
        self.materials.iter().find(|m| m.id == id)
    }

    pub fn by_category(&self) -> BTreeMap<&str, Vec<&MaterialView>> {
        let mut grouped: BTreeMap<&str, Vec<&MaterialView>> = BTreeMap::new();
        for m in &self.materials {
            grouped.entry(m.category.as_str()).or_default().push(m);
        }
        grouped
    }

    pub fn totals(&self) -> CatalogTotals {
        self.materials.iter().fold(
            CatalogTotals {
                materials: self.materials.len(),
                ..CatalogTotals::default()
            },
            |mut acc, m| {
                acc.units_in_depot += u64::from(m.in_depot);
                acc.units_checked_out += u64::from(m.checked_out);
                acc.units_withdrawn += u64::from(m.withdrawn);
                acc.units_non_operational += u64::from(m.non_operational);
                acc
            },
        )
    }
}
