use thiserror::Error;

/// Ledger rule violations.
///
/// Every variant is a recoverable, caller-facing failure. When one is returned the
/// ledger has not changed and no movement has been produced.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The reference does not resolve to exactly one record.
    #[error("unknown material: {0}")]
    UnknownMaterial(String),

    #[error("material '{name}' already exists in category '{category}'")]
    DuplicateMaterial { category: String, name: String },

    /// Not enough units in the bucket a checkout or return draws from.
    #[error("insufficient stock of '{material}': requested {requested}, available {available}")]
    InsufficientStock {
        material: String,
        requested: u32,
        available: u32,
    },

    #[error("insufficient operational stock of '{material}': requested {requested}, operational {available}")]
    InsufficientOperationalStock {
        material: String,
        requested: u32,
        available: u32,
    },

    #[error("insufficient non-operational stock of '{material}': requested {requested}, non-operational {available}")]
    InsufficientNonOperationalStock {
        material: String,
        requested: u32,
        available: u32,
    },

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("invalid material name: {0}")]
    InvalidName(String),

    /// A total revision would drop below the units that are not in the depot.
    #[error("cannot set total of '{material}' to {requested}: {committed} units are checked out or withdrawn")]
    TotalBelowCommitted {
        material: String,
        requested: u32,
        committed: u32,
    },

    /// Loaded records that break the quantity invariants.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl LedgerError {
    pub fn unknown(reference: impl core::fmt::Display) -> Self {
        Self::UnknownMaterial(reference.to_string())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}
