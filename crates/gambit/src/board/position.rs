//! Position management on top of shakmaty.
//!
//! [`BoardPosition`] owns a single position value and exposes the operations
//! the orchestrator needs: legality checking, move application with SAN,
//! move-kind classification for the executor, and terminal-outcome detection.

use shakmaty::{
    fen::Fen, san::San, uci::UciMove as ShakmatyUciMove, CastlingMode, Chess, Move, Position,
};
use thiserror::Error;

use super::types::{Color, LegalMove, MoveKind, UciMove};

/// Errors from position operations.
#[derive(Debug, Error)]
pub enum BoardError {
    /// Invalid FEN string.
    #[error("invalid FEN: {0}")]
    InvalidFen(String),

    /// Invalid UCI move format.
    #[error("invalid UCI move: {0}")]
    InvalidUciMove(String),

    /// Move is not legal in the current position.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    /// The position is already terminal.
    #[error("game is already over")]
    GameOver,
}

/// Why a position is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawReason {
    /// Neither side can deliver mate.
    InsufficientMaterial,
    /// Seventy-five moves without a capture or pawn move (automatic draw).
    SeventyFiveMoves,
}

impl std::fmt::Display for DrawReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientMaterial => write!(f, "insufficient_material"),
            Self::SeventyFiveMoves => write!(f, "seventy_five_moves"),
        }
    }
}

/// Terminal outcome of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Outcome {
    /// Checkmate; the given color won.
    Checkmate(Color),
    /// Stalemate.
    Stalemate,
    /// Drawn position.
    Draw(DrawReason),
}

/// A chess position with validation, application, and outcome detection.
#[derive(Debug, Clone)]
pub struct BoardPosition {
    position: Chess,
}

impl BoardPosition {
    /// The standard starting position.
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Chess::default(),
        }
    }

    /// Create a position from a FEN string.
    pub fn from_fen(fen: &str) -> Result<Self, BoardError> {
        let fen: Fen = fen
            .parse()
            .map_err(|e| BoardError::InvalidFen(format!("{e}")))?;
        let position: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| BoardError::InvalidFen(format!("{e}")))?;
        Ok(Self { position })
    }

    /// Get the FEN string for the current position.
    #[must_use]
    pub fn to_fen(&self) -> String {
        Fen::from_position(&self.position, shakmaty::EnPassantMode::Legal).to_string()
    }

    /// Whose turn it is to move.
    #[must_use]
    pub fn turn(&self) -> Color {
        self.position.turn().into()
    }

    /// Whether the side to move is in check.
    #[must_use]
    pub fn is_check(&self) -> bool {
        self.position.is_check()
    }

    /// Terminal outcome of the position, if any.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        if self.position.is_checkmate() {
            // The side to move is mated; the other color wins.
            Some(Outcome::Checkmate(self.turn().opposite()))
        } else if self.position.is_stalemate() {
            Some(Outcome::Stalemate)
        } else if self.position.is_insufficient_material() {
            Some(Outcome::Draw(DrawReason::InsufficientMaterial))
        } else if self.position.halfmoves() >= 150 {
            Some(Outcome::Draw(DrawReason::SeventyFiveMoves))
        } else {
            None
        }
    }

    /// Whether the game is over.
    #[must_use]
    pub fn is_game_over(&self) -> bool {
        self.outcome().is_some()
    }

    /// All legal moves in the current position.
    #[must_use]
    pub fn legal_moves(&self) -> Vec<LegalMove> {
        let legals = self.position.legal_moves();
        legals.iter().map(|m| self.describe_move(m)).collect()
    }

    /// Validate a move without applying it. Returns the SAN notation the move
    /// would have.
    pub fn validate(&self, uci: &UciMove) -> Result<String, BoardError> {
        if self.is_game_over() {
            return Err(BoardError::GameOver);
        }
        let m = self.parse_uci(uci)?;
        if !self.position.is_legal(m) {
            return Err(BoardError::IllegalMove(uci.to_string()));
        }
        Ok(San::from_move(&self.position, m).to_string())
    }

    /// Whether a move is legal here.
    #[must_use]
    pub fn is_legal(&self, uci: &UciMove) -> bool {
        self.validate(uci).is_ok()
    }

    /// Classify a legal move for the executor. Must be called on the position
    /// *before* the move is applied.
    pub fn classify(&self, uci: &UciMove) -> Result<MoveKind, BoardError> {
        let m = self.parse_uci(uci)?;
        if !self.position.is_legal(m) {
            return Err(BoardError::IllegalMove(uci.to_string()));
        }
        Ok(Self::kind_of(&m))
    }

    /// Validate and apply a move. Returns the SAN notation on success.
    pub fn apply(&mut self, uci: &UciMove) -> Result<String, BoardError> {
        if self.is_game_over() {
            return Err(BoardError::GameOver);
        }

        let m = self.parse_uci(uci)?;
        // SAN depends on the position before the move.
        let san = San::from_move(&self.position, m);

        if !self.position.is_legal(m) {
            return Err(BoardError::IllegalMove(uci.to_string()));
        }

        self.position = self
            .position
            .clone()
            .play(m)
            .map_err(|_| BoardError::IllegalMove(uci.to_string()))?;

        Ok(san.to_string())
    }

    /// Halfmove clock (for the fifty/seventy-five move rules).
    #[must_use]
    pub fn halfmove_clock(&self) -> u32 {
        self.position.halfmoves()
    }

    /// Fullmove number.
    #[must_use]
    pub fn fullmove_number(&self) -> u32 {
        self.position.fullmoves().get()
    }

    fn parse_uci(&self, uci: &UciMove) -> Result<Move, BoardError> {
        let parsed: ShakmatyUciMove = uci
            .as_str()
            .parse()
            .map_err(|_| BoardError::InvalidUciMove(uci.to_string()))?;

        parsed
            .to_move(&self.position)
            .map_err(|_| BoardError::IllegalMove(uci.to_string()))
    }

    fn kind_of(m: &Move) -> MoveKind {
        match m {
            Move::Castle { .. } => MoveKind::Castle,
            Move::EnPassant { .. } => MoveKind::EnPassant,
            _ if m.promotion().is_some() => MoveKind::Promotion,
            _ if m.is_capture() => MoveKind::Capture,
            _ => MoveKind::Normal,
        }
    }

    fn describe_move(&self, m: &Move) -> LegalMove {
        let san = San::from_move(&self.position, *m);
        let uci = ShakmatyUciMove::from_move(*m, CastlingMode::Standard);

        let mut after = self.position.clone();
        after.play_unchecked(*m);

        LegalMove {
            uci: uci.to_string(),
            san: san.to_string(),
            kind: Self::kind_of(m),
            is_check: after.is_check(),
        }
    }
}

impl Default for BoardPosition {
    fn default() -> Self {
        Self::new()
    }
}
