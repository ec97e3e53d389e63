//! Movement events and the append-only movement log.

pub mod event;
pub mod log;
pub mod movement;

pub use event::Event;
pub use log::{MovementFilter, MovementLog};
pub use movement::{MovementAction, MovementEvent, NewMovement, ParseActionError};
