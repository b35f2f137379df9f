//! Core data model for the notary annotation session.
//!
//! - [`op`]: annotation operations and their JSON wire shape
//! - [`canvas`]: per-page live operation sequences
//! - [`journal`]: session-scoped append-only operation log
//! - [`participant`]: roles, seats and the two-party roster

pub mod canvas;
pub mod journal;
pub mod op;
pub mod participant;

pub use canvas::CanvasState;
pub use journal::{LogEntry, OperationLog, Origin};
pub use op::{
    ClearOp, Color, DrawOp, Operation, OperationError, OperationKind, Point, TextOp, MAX_FONT_SIZE,
};
pub use participant::{Participant, Role, Roster, UnknownRole};
