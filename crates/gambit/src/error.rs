use crate::board::BoardError;
use crate::types::{BoardId, GameId};

/// Errors surfaced by the orchestrator's public API.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A non-terminal game already holds the claim on this board.
    #[error("board {board_id} already has an active game")]
    BoardAlreadyActive { board_id: BoardId },

    /// No live or archived game with this ID.
    #[error("game {game_id} not found")]
    GameNotFound { game_id: GameId },

    /// The game's actor has shut down and can no longer accept events.
    #[error("game {game_id} is no longer accepting events")]
    GameClosed { game_id: GameId },

    /// The board model rejected an input (bad FEN, malformed move).
    #[error(transparent)]
    Board(#[from] BoardError),

    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}
