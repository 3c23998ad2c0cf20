//! Authoritative per-game state: phase machine data, the append-only move
//! log, pending-request bookkeeping, faults, and the read-only snapshot
//! projection.
//!
//! Only the turn coordinator mutates a [`GameState`]; everything else sees
//! [`GameSnapshot`] values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::board::{BoardError, BoardPosition, Color, DrawReason, MoveKind, Outcome, UciMove};
use crate::gateway::{ExecuteCommand, MechanicalFault, RequestKind};
use crate::types::{BoardId, CorrelationId, GameId};

/// Phase of a game's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    /// Session created, not yet started.
    Created,
    /// Deadline-free wait for the human to touch the board.
    AwaitingHumanMove,
    /// A `detect_move` request is in flight.
    ConfirmingHumanMove,
    /// A confirmed human candidate is being validated and committed.
    ApplyingHumanMove,
    /// A `compute_move` request is in flight.
    AwaitingEngineMove,
    /// An engine candidate is being validated and committed.
    ApplyingEngineMove,
    /// An `execute_move` request is in flight.
    ExecutingRobotMove,
    /// Stopped on a fault; resumes only on explicit operator action.
    Paused,
    /// Terminal.
    GameOver,
}

impl GamePhase {
    /// Whether a collaborator request must be in flight in this phase.
    #[must_use]
    pub const fn awaits_collaborator(&self) -> bool {
        matches!(
            self,
            Self::ConfirmingHumanMove | Self::AwaitingEngineMove | Self::ExecutingRobotMove
        )
    }

    /// Whether this phase is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::GameOver)
    }
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::AwaitingHumanMove => "awaiting_human_move",
            Self::ConfirmingHumanMove => "confirming_human_move",
            Self::ApplyingHumanMove => "applying_human_move",
            Self::AwaitingEngineMove => "awaiting_engine_move",
            Self::ApplyingEngineMove => "applying_engine_move",
            Self::ExecutingRobotMove => "executing_robot_move",
            Self::Paused => "paused",
            Self::GameOver => "game_over",
        };
        write!(f, "{s}")
    }
}

/// Which side committed a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mover {
    Human,
    Engine,
}

impl std::fmt::Display for Mover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Human => write!(f, "human"),
            Self::Engine => write!(f, "engine"),
        }
    }
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Checkmate; the given color won.
    Checkmate { winner: Color },
    /// Stalemate.
    Stalemate,
    /// Drawn position.
    Draw(DrawReason),
    /// The human resigned; the given color won.
    Resignation { winner: Color },
    /// Explicit abort.
    Aborted,
    /// Forced termination after an internal invariant violation.
    Fatal,
}

impl From<Outcome> for EndReason {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Checkmate(winner) => Self::Checkmate { winner },
            Outcome::Stalemate => Self::Stalemate,
            Outcome::Draw(reason) => Self::Draw(reason),
        }
    }
}

/// Operator-facing fault codes. A paused game carries exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameFault {
    /// Detection timed out repeatedly for the same awaited move.
    DetectionTimeout,
    /// Detection kept reporting below-threshold confidence.
    LowConfidence,
    /// The detector kept reporting a move that is illegal against the
    /// authoritative position; the physical board likely disagrees with it.
    BoardMismatch,
    /// The arm could not grasp or release a piece.
    GraspFailure,
    /// The arm's path is blocked.
    PathBlocked,
    /// Execution timed out; the arm may be mid-motion.
    ExecutionTimeout,
    /// Controller-level hardware error.
    HardwareFault,
    /// The engine failed even the last-resort fallback request.
    EngineUnavailable,
    /// The game was recovered from a restart while a collaborator request
    /// was in flight; the physical board must be confirmed by an operator.
    RecoveryRequired,
    /// The orchestrator detected an internal inconsistency.
    InternalDefect { detail: String },
}

impl GameFault {
    /// Human-readable operator instruction for this fault.
    #[must_use]
    pub fn operator_message(&self) -> &'static str {
        match self {
            Self::DetectionTimeout | Self::LowConfidence => {
                "confirm the move on the physical board, then resume"
            }
            Self::BoardMismatch => {
                "physical board disagrees with the game position; reconcile, then resume"
            }
            Self::GraspFailure | Self::PathBlocked | Self::ExecutionTimeout
            | Self::HardwareFault => {
                "the game position is ahead of the physical board; place the piece by hand or clear the fault, then resume"
            }
            Self::EngineUnavailable => "check the engine service, then resume",
            Self::RecoveryRequired => "verify the physical board matches the position, then resume",
            Self::InternalDefect { .. } => "internal defect; the game cannot continue",
        }
    }
}

impl From<MechanicalFault> for GameFault {
    fn from(fault: MechanicalFault) -> Self {
        match fault {
            MechanicalFault::GraspFailure => Self::GraspFailure,
            MechanicalFault::PathBlocked => Self::PathBlocked,
            MechanicalFault::HardwareFault => Self::HardwareFault,
        }
    }
}

/// What a paused game re-issues when the operator resumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeAction {
    /// Re-issue move detection.
    Redetect,
    /// Re-issue the engine request (from the top of the fallback ladder).
    Recompute,
    /// Re-issue the same physical move.
    Reexecute { command: ExecuteCommand },
}

/// Descriptor of the single in-flight collaborator request.
///
/// Retry state lives here explicitly so it is inspectable and testable
/// without real timers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Correlates the eventual completion or timeout event.
    pub correlation_id: CorrelationId,
    /// What was asked of which collaborator.
    pub kind: RequestKind,
    /// When the request was issued.
    pub issued_at: DateTime<Utc>,
    /// How long the coordinator will wait before treating it as failed.
    pub deadline: Duration,
    /// 1-based attempt number for this semantic request.
    pub attempt: u32,
}

/// One committed move. Entries are append-only and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Which side moved.
    pub mover: Mover,
    /// The mover's color.
    pub color: Color,
    /// UCI notation.
    pub uci: UciMove,
    /// SAN notation.
    pub san: String,
    /// Executor classification of the move.
    pub kind: MoveKind,
    /// Position after the move.
    pub fen_after: String,
    /// When the move was committed.
    pub committed_at: DateTime<Utc>,
}

/// Per-game creation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Which color the human plays.
    pub human_color: Color,
    /// Engine strength, clamped to 1..=10.
    pub difficulty: u8,
    /// Optional custom starting position.
    pub start_fen: Option<String>,
}

impl GameConfig {
    /// Highest supported difficulty rung.
    pub const MAX_DIFFICULTY: u8 = 10;

    /// Create a config with the standard starting position.
    #[must_use]
    pub fn new(human_color: Color, difficulty: u8) -> Self {
        Self {
            human_color,
            difficulty: difficulty.clamp(1, Self::MAX_DIFFICULTY),
            start_fen: None,
        }
    }
}

/// The authoritative state of one match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    /// Unique match ID.
    pub game_id: GameId,
    /// Physical board this match runs on.
    pub board_id: BoardId,
    /// The human's color.
    pub human_color: Color,
    /// The engine's color.
    pub engine_color: Color,
    /// Engine strength, mutable between moves only.
    pub difficulty: u8,
    /// Current position. Single source of truth; mutated only after a move
    /// is committed.
    pub board_fen: String,
    /// Side to move in the starting position (supports custom starts).
    pub initial_turn: Color,
    /// Append-only log of committed moves.
    pub move_log: Vec<MoveRecord>,
    /// Current state-machine phase.
    pub phase: GamePhase,
    /// The at-most-one in-flight collaborator request.
    pub pending_request: Option<PendingRequest>,
    /// Fault carried while `Paused` (or after a fatal end).
    pub fault: Option<GameFault>,
    /// What to re-issue on operator resume.
    pub resume_action: Option<ResumeAction>,
    /// Terminal request parked while a robot execution is in flight.
    pub deferred_end: Option<EndReason>,
    /// Why the game ended, once terminal.
    pub end_reason: Option<EndReason>,
    /// Evaluation metadata from the engine's latest committed move.
    pub last_evaluation: Option<crate::gateway::EngineEvaluation>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the game reached a terminal phase.
    pub finished_at: Option<DateTime<Utc>>,
}

impl GameState {
    /// Create a fresh game in the `Created` phase.
    pub fn new(
        game_id: GameId,
        board_id: BoardId,
        config: &GameConfig,
    ) -> Result<Self, BoardError> {
        let position = match &config.start_fen {
            Some(fen) => BoardPosition::from_fen(fen)?,
            None => BoardPosition::new(),
        };
        let initial_turn = position.turn();

        Ok(Self {
            game_id,
            board_id,
            human_color: config.human_color,
            engine_color: config.human_color.opposite(),
            difficulty: config.difficulty.clamp(1, GameConfig::MAX_DIFFICULTY),
            board_fen: position.to_fen(),
            initial_turn,
            move_log: Vec::new(),
            phase: GamePhase::Created,
            pending_request: None,
            fault: None,
            resume_action: None,
            deferred_end: None,
            end_reason: None,
            last_evaluation: None,
            created_at: Utc::now(),
            finished_at: None,
        })
    }

    /// Side to move, derived from move-log parity.
    #[must_use]
    pub fn to_move(&self) -> Color {
        if self.move_log.len() % 2 == 0 {
            self.initial_turn
        } else {
            self.initial_turn.opposite()
        }
    }

    /// Which side a color belongs to.
    #[must_use]
    pub fn mover_of(&self, color: Color) -> Mover {
        if color == self.human_color {
            Mover::Human
        } else {
            Mover::Engine
        }
    }

    /// The most recent committed move, if any.
    #[must_use]
    pub fn last_move(&self) -> Option<&MoveRecord> {
        self.move_log.last()
    }

    /// Verify the cross-field consistency rules that must hold after every
    /// committed transition. A violation is an internal defect: the game is
    /// forced to `GameOver` rather than continuing in an unknown state.
    pub fn check_invariants(&self) -> Result<(), String> {
        let position = BoardPosition::from_fen(&self.board_fen)
            .map_err(|e| format!("stored position is unparseable: {e}"))?;

        if !self.phase.is_terminal() && position.turn() != self.to_move() {
            return Err(format!(
                "position says {} to move but move log parity says {}",
                position.turn(),
                self.to_move()
            ));
        }

        if self.pending_request.is_some() != self.phase.awaits_collaborator() {
            return Err(format!(
                "pending_request {} in phase {}",
                if self.pending_request.is_some() {
                    "set"
                } else {
                    "missing"
                },
                self.phase
            ));
        }

        Ok(())
    }

    /// Normalize a game recovered from durable storage.
    ///
    /// A request that was in flight when the process died cannot be trusted:
    /// the collaborator may or may not have acted. The game is demoted to
    /// `Paused` with [`GameFault::RecoveryRequired`] and a resume action
    /// re-derived from the phase, so the operator confirms the physical board
    /// before anything is re-issued. Returns `true` if the game was demoted.
    pub fn normalize_for_recovery(&mut self) -> bool {
        let resume = match self.phase {
            GamePhase::ConfirmingHumanMove | GamePhase::ApplyingHumanMove => ResumeAction::Redetect,
            GamePhase::AwaitingEngineMove => ResumeAction::Recompute,
            GamePhase::ApplyingEngineMove | GamePhase::ExecutingRobotMove => {
                match self.last_move() {
                    Some(record) => ResumeAction::Reexecute {
                        command: ExecuteCommand {
                            from: record.uci.from_square(),
                            to: record.uci.to_square(),
                            kind: record.kind,
                        },
                    },
                    // No committed move to execute; wait for the human again.
                    None => ResumeAction::Redetect,
                }
            }
            _ => return false,
        };

        self.pending_request = None;
        self.resume_action = Some(resume);
        self.fault = Some(GameFault::RecoveryRequired);
        self.phase = GamePhase::Paused;
        true
    }

    /// Build the read-only projection of this state.
    #[must_use]
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            game_id: self.game_id,
            board_id: self.board_id.clone(),
            fen: self.board_fen.clone(),
            phase: self.phase,
            to_move: self.to_move(),
            move_count: self.move_log.len(),
            last_move: self.move_log.last().cloned(),
            fault: self.fault.clone(),
            end_reason: self.end_reason,
            difficulty: self.difficulty,
        }
    }
}

/// Read-only projection of a game, emitted on every committed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub game_id: GameId,
    pub board_id: BoardId,
    pub fen: String,
    pub phase: GamePhase,
    pub to_move: Color,
    pub move_count: usize,
    pub last_move: Option<MoveRecord>,
    pub fault: Option<GameFault>,
    pub end_reason: Option<EndReason>,
    pub difficulty: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> GameState {
        GameState::new(
            GameId::new(),
            BoardId::new("cell-1"),
            &GameConfig::new(Color::White, 3),
        )
        .unwrap()
    }

    #[test]
    fn new_game_defaults() {
        let game = state();
        assert_eq!(game.phase, GamePhase::Created);
        assert_eq!(game.human_color, Color::White);
        assert_eq!(game.engine_color, Color::Black);
        assert_eq!(game.to_move(), Color::White);
        assert!(game.move_log.is_empty());
        assert!(game.pending_request.is_none());
        game.check_invariants().unwrap();
    }

    #[test]
    fn difficulty_is_clamped() {
        let config = GameConfig::new(Color::White, 42);
        assert_eq!(config.difficulty, GameConfig::MAX_DIFFICULTY);
        let config = GameConfig::new(Color::White, 0);
        assert_eq!(config.difficulty, 1);
    }

    #[test]
    fn custom_start_sets_initial_turn() {
        let config = GameConfig {
            human_color: Color::White,
            difficulty: 3,
            start_fen: Some(
                "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1".to_string(),
            ),
        };
        let game = GameState::new(GameId::new(), BoardId::new("cell-1"), &config).unwrap();
        assert_eq!(game.initial_turn, Color::Black);
        assert_eq!(game.to_move(), Color::Black);
        game.check_invariants().unwrap();
    }

    #[test]
    fn invalid_start_fen_rejected() {
        let config = GameConfig {
            human_color: Color::White,
            difficulty: 3,
            start_fen: Some("garbage".to_string()),
        };
        assert!(GameState::new(GameId::new(), BoardId::new("cell-1"), &config).is_err());
    }

    #[test]
    fn parity_invariant_catches_desync() {
        let mut game = state();
        // Claim a move was made without updating the position.
        game.move_log.push(MoveRecord {
            mover: Mover::Human,
            color: Color::White,
            uci: UciMove::new("e2e4").unwrap(),
            san: "e4".to_string(),
            kind: MoveKind::Normal,
            fen_after: game.board_fen.clone(),
            committed_at: Utc::now(),
        });
        assert!(game.check_invariants().is_err());
    }

    #[test]
    fn pending_request_invariant() {
        let mut game = state();
        game.phase = GamePhase::ConfirmingHumanMove;
        // Awaiting a collaborator with no pending request is a violation.
        assert!(game.check_invariants().is_err());

        game.pending_request = Some(PendingRequest {
            correlation_id: CorrelationId::new(),
            kind: RequestKind::DetectMove,
            issued_at: Utc::now(),
            deadline: Duration::from_secs(10),
            attempt: 1,
        });
        game.check_invariants().unwrap();

        // And a pending request outside an awaiting phase is one too.
        game.phase = GamePhase::AwaitingHumanMove;
        assert!(game.check_invariants().is_err());
    }

    #[test]
    fn recovery_demotes_in_flight_phases() {
        let mut game = state();
        game.phase = GamePhase::AwaitingEngineMove;
        game.pending_request = Some(PendingRequest {
            correlation_id: CorrelationId::new(),
            kind: RequestKind::ComputeMove,
            issued_at: Utc::now(),
            deadline: Duration::from_secs(30),
            attempt: 1,
        });

        assert!(game.normalize_for_recovery());
        assert_eq!(game.phase, GamePhase::Paused);
        assert_eq!(game.fault, Some(GameFault::RecoveryRequired));
        assert_eq!(game.resume_action, Some(ResumeAction::Recompute));
        assert!(game.pending_request.is_none());
        game.check_invariants().unwrap();
    }

    #[test]
    fn recovery_reexecutes_last_committed_move() {
        let mut game = state();
        game.move_log.push(MoveRecord {
            mover: Mover::Engine,
            color: Color::White,
            uci: UciMove::new("e2e4").unwrap(),
            san: "e4".to_string(),
            kind: MoveKind::Normal,
            fen_after: "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1".to_string(),
            committed_at: Utc::now(),
        });
        game.board_fen = game.move_log[0].fen_after.clone();
        game.phase = GamePhase::ExecutingRobotMove;

        assert!(game.normalize_for_recovery());
        match game.resume_action {
            Some(ResumeAction::Reexecute { ref command }) => {
                assert_eq!(command.from.to_string(), "e2");
                assert_eq!(command.to.to_string(), "e4");
                assert_eq!(command.kind, MoveKind::Normal);
            }
            ref other => panic!("expected Reexecute, got {other:?}"),
        }
    }

    #[test]
    fn recovery_leaves_stable_phases_alone() {
        let mut game = state();
        game.phase = GamePhase::AwaitingHumanMove;
        assert!(!game.normalize_for_recovery());
        assert_eq!(game.phase, GamePhase::AwaitingHumanMove);
    }

    #[test]
    fn snapshot_reflects_state() {
        let game = state();
        let snapshot = game.snapshot();
        assert_eq!(snapshot.game_id, game.game_id);
        assert_eq!(snapshot.phase, GamePhase::Created);
        assert_eq!(snapshot.move_count, 0);
        assert!(snapshot.last_move.is_none());
        assert!(snapshot.fault.is_none());
    }

    #[test]
    fn snapshot_serializes() {
        let json = serde_json::to_string(&state().snapshot()).unwrap();
        assert!(json.contains("\"phase\":\"created\""));
    }
}
