//! Pure chess-rules model.
//!
//! Everything here is a deterministic function of its inputs: no I/O, no
//! hidden state. The rest of the crate talks to positions through
//! [`BoardPosition`] and the serializable wrapper types in [`types`]; shakmaty
//! never leaks past this module.

pub mod position;
pub mod types;

pub use position::{BoardError, BoardPosition, DrawReason, Outcome};
pub use types::{Color, LegalMove, MoveKind, PieceType, Square, UciMove};
