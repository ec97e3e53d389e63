use serde::{Deserialize, Serialize};

use parque_core::{Entity, MaterialId};

use crate::error::LedgerError;

/// Category used when none is given.
pub const DEFAULT_CATEGORY: &str = "uncategorized";

/// Display unit used when none is given.
pub const DEFAULT_UNIT: &str = "uds";

/// One line of the catalog.
///
/// Quantity invariants (checked by [`MaterialRecord::check_invariants`]):
/// - `in_depot + checked_out + withdrawn == total_quantity`
/// - `operational <= total_quantity`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRecord {
    pub id: MaterialId,
    pub category: String,
    pub name: String,
    pub total_quantity: u32,
    pub in_depot: u32,
    pub checked_out: u32,
    /// Units pulled out of the depot because they were marked inoperative.
    #[serde(default)]
    pub withdrawn: u32,
    pub operational: u32,
    pub unit: String,
}

impl MaterialRecord {
    /// A fresh record: everything in the depot, everything usable.
    pub fn new(
        id: MaterialId,
        category: Option<&str>,
        name: &str,
        total_quantity: u32,
        unit: Option<&str>,
    ) -> Self {
        Self {
            id,
            category: normalize_category(category),
            name: name.trim().to_string(),
            total_quantity,
            in_depot: total_quantity,
            checked_out: 0,
            withdrawn: 0,
            operational: total_quantity,
            unit: normalize_unit(unit),
        }
    }

    /// Derived, never stored.
    pub fn non_operational(&self) -> u32 {
        self.total_quantity.saturating_sub(self.operational)
    }

    /// Units that are accounted for outside the depot.
    pub fn committed(&self) -> u32 {
        self.checked_out + self.withdrawn
    }

    pub fn check_invariants(&self) -> Result<(), LedgerError> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::invariant(format!(
                "material {} has a blank name",
                self.id
            )));
        }
        let located = u64::from(self.in_depot) + u64::from(self.checked_out) + u64::from(self.withdrawn);
        if located != u64::from(self.total_quantity) {
            return Err(LedgerError::invariant(format!(
                "'{}': in_depot {} + checked_out {} + withdrawn {} != total {}",
                self.name, self.in_depot, self.checked_out, self.withdrawn, self.total_quantity
            )));
        }
        if self.operational > self.total_quantity {
            return Err(LedgerError::invariant(format!(
                "'{}': operational {} exceeds total {}",
                self.name, self.operational, self.total_quantity
            )));
        }
        // Only inoperative units are ever withdrawn.
        if self.withdrawn > self.non_operational() {
            return Err(LedgerError::invariant(format!(
                "'{}': withdrawn {} exceeds non-operational {}",
                self.name,
                self.withdrawn,
                self.non_operational()
            )));
        }
        Ok(())
    }

    pub(crate) fn is_named(&self, category: Option<&str>, name: &str) -> bool {
        self.name == name.trim()
            && category.is_none_or(|c| self.category == normalize_category(Some(c)))
    }
}

impl Entity for MaterialRecord {
    type Id = MaterialId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

pub(crate) fn normalize_category(category: Option<&str>) -> String {
    match category.map(str::trim) {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => DEFAULT_CATEGORY.to_string(),
    }
}

pub(crate) fn normalize_unit(unit: Option<&str>) -> String {
    match unit.map(str::trim) {
        Some(u) if !u.is_empty() => u.to_string(),
        _ => DEFAULT_UNIT.to_string(),
    }
}

/// How a caller points at a material.
///
/// A bare name must be unique across all categories to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialRef {
    Id(MaterialId),
    Name {
        category: Option<String>,
        name: String,
    },
}

impl MaterialRef {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name {
            category: None,
            name: name.into(),
        }
    }

    pub fn in_category(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Name {
            category: Some(category.into()),
            name: name.into(),
        }
    }
}

impl From<MaterialId> for MaterialRef {
    fn from(value: MaterialId) -> Self {
        Self::Id(value)
    }
}

impl core::fmt::Display for MaterialRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MaterialRef::Id(id) => write!(f, "{id}"),
            MaterialRef::Name {
                category: Some(c),
                name,
            } => write!(f, "{c}/{name}"),
            MaterialRef::Name {
                category: None,
                name,
            } => f.write_str(name),
        }
    }
}
