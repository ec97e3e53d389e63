//! Inventory ledger domain module.
//!
//! This crate contains the rules for moving equipment between the depot, users,
//! and repair, implemented purely as deterministic domain logic (no IO, no
//! storage). Decisions are taken by [`Ledger::handle`](parque_core::Aggregate::handle)
//! and state only changes through `apply`, so a rejected command never leaves a
//! half-applied record behind.

pub mod catalog;
pub mod error;
pub mod ledger;
pub mod material;
pub mod snapshot;

pub use catalog::default_catalog;
pub use error::LedgerError;
pub use ledger::{
    AddMaterial, Checkout, Ledger, LedgerCommand, LedgerEvent, MarkInoperative, MarkOperational,
    MaterialAdded, MaterialCheckedOut, MaterialMarkedInoperative, MaterialMarkedOperational,
    MaterialRenamed, MaterialReturned, MovementContext, RenameMaterial, ReturnItem, ReviseTotal,
    TotalRevised,
};
pub use material::{DEFAULT_CATEGORY, DEFAULT_UNIT, MaterialRecord, MaterialRef};
pub use snapshot::{CatalogTotals, LedgerSnapshot, MaterialView};
