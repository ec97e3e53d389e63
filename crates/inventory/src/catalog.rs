//! Seed catalog for a fresh data directory.

use parque_core::MaterialId;

use crate::material::{DEFAULT_CATEGORY, MaterialRecord};

const SEED: &[(&str, u32, &str)] = &[
    ("Pala inglesa", 10, "uds"),
    ("Zapapico (mango corto)", 16, "uds"),
    ("Almádena", 4, "uds"),
    ("Motosierra Stihl", 1, "ud"),
    ("Tijera corta-alambrada zapador", 8, "uds"),
];

/// The sapper depot's starting equipment, all in the depot and operational.
pub fn default_catalog() -> Vec<MaterialRecord> {
    SEED.iter()
        .map(|(name, total, unit)| {
            MaterialRecord::new(MaterialId::new(), Some(DEFAULT_CATEGORY), name, *total, Some(unit))
        })
        .collect()
}
