//! Narrow async contracts for the three external collaborators.
//!
//! The orchestrator core never talks to a camera, an engine process, or an
//! arm directly; it issues requests through these traits and consumes the
//! terminal events the dispatcher deposits on the game's inbox. Any
//! conforming implementation — hardware-backed, simulated, or scripted for
//! tests — can be substituted.
//!
//! Implementations must not retry internally: retry policy, attempt counting,
//! and backoff all live in the turn coordinator where they are observable.

pub mod dispatch;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::board::{MoveKind, Square, UciMove};

pub use dispatch::GatewayDispatcher;

/// Mechanical failures the arm can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MechanicalFault {
    /// The gripper failed to pick up or release a piece.
    GraspFailure,
    /// The planned trajectory is obstructed.
    PathBlocked,
    /// Controller-level hardware error.
    HardwareFault,
}

impl std::fmt::Display for MechanicalFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GraspFailure => write!(f, "grasp_failure"),
            Self::PathBlocked => write!(f, "path_blocked"),
            Self::HardwareFault => write!(f, "hardware_fault"),
        }
    }
}

/// Normalized failure shape for all three collaborators.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum GatewayError {
    /// The collaborator could not be reached or refused the request.
    #[error("collaborator unavailable: {reason}")]
    Unavailable { reason: String },

    /// The collaborator reported it could not finish in time.
    ///
    /// The coordinator's own deadline timer is authoritative; this variant
    /// exists for collaborators that give up early on their own.
    #[error("collaborator timed out")]
    Timeout,

    /// The engine found no legal move. Should coincide with the board model
    /// reporting a terminal position.
    #[error("no legal move in position")]
    NoLegalMove,

    /// The arm reported a mechanical failure.
    #[error("mechanical fault: {0}")]
    Mechanical(MechanicalFault),
}

/// Where an unconfirmed move claim came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// The vision detector.
    Vision,
    /// The chess engine.
    Engine,
}

/// An unconfirmed move claim from the detector or the decider.
///
/// Transient: it is either committed through the board model or discarded,
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveCandidate {
    /// The claimed move.
    pub uci: UciMove,
    /// Which collaborator produced the claim.
    pub source: CandidateSource,
    /// Detector confidence in [0, 1]. `None` for engine candidates.
    pub confidence: Option<f64>,
    /// Opaque reference to raw evidence (e.g. a captured frame id).
    pub evidence_ref: Option<String>,
}

impl MoveCandidate {
    /// A detector claim with a confidence score.
    #[must_use]
    pub fn from_vision(uci: UciMove, confidence: f64) -> Self {
        Self {
            uci,
            source: CandidateSource::Vision,
            confidence: Some(confidence),
            evidence_ref: None,
        }
    }

    /// An engine claim.
    #[must_use]
    pub fn from_engine(uci: UciMove) -> Self {
        Self {
            uci,
            source: CandidateSource::Engine,
            confidence: None,
            evidence_ref: None,
        }
    }
}

/// Result of asking the vision collaborator whether a move happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Whether the physical board differs from the expected position.
    pub changed: bool,
    /// The detected move, when one could be reconstructed.
    pub candidate: Option<MoveCandidate>,
}

impl DetectionReport {
    /// Report that nothing changed on the board.
    #[must_use]
    pub fn unchanged() -> Self {
        Self {
            changed: false,
            candidate: None,
        }
    }

    /// Report a detected move with a confidence score.
    #[must_use]
    pub fn moved(uci: UciMove, confidence: f64) -> Self {
        Self {
            changed: true,
            candidate: Some(MoveCandidate::from_vision(uci, confidence)),
        }
    }
}

/// Engine search metadata attached to a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEvaluation {
    /// Score in centipawns from the engine's point of view.
    pub score_cp: i32,
    /// Search depth reached.
    pub depth: u32,
    /// Principal variation, best line first.
    pub principal_variation: Vec<UciMove>,
}

/// Result of asking the engine collaborator for a move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineDecision {
    /// The chosen move.
    pub candidate: MoveCandidate,
    /// Search metadata.
    pub evaluation: EngineEvaluation,
}

/// A physical move order for the arm. The caller guarantees the move has
/// already been validated against the authoritative position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteCommand {
    /// Source square.
    pub from: Square,
    /// Destination square.
    pub to: Square,
    /// What the arm has to do beyond a simple pick-and-place.
    pub kind: MoveKind,
}

/// What kind of collaborator work a pending request represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    DetectMove,
    ComputeMove,
    ExecuteMove,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DetectMove => write!(f, "detect_move"),
            Self::ComputeMove => write!(f, "compute_move"),
            Self::ExecuteMove => write!(f, "execute_move"),
        }
    }
}

/// A fully parameterized collaborator request, ready for dispatch.
#[derive(Debug, Clone)]
pub enum GatewayRequest {
    /// Ask the detector whether a move occurred relative to this position.
    DetectMove { before_fen: String },
    /// Ask the engine for a move.
    ComputeMove {
        fen: String,
        difficulty: u8,
        time_budget: Duration,
    },
    /// Ask the arm to perform an already-validated move.
    ExecuteMove { command: ExecuteCommand },
}

impl GatewayRequest {
    /// The request's kind tag.
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::DetectMove { .. } => RequestKind::DetectMove,
            Self::ComputeMove { .. } => RequestKind::ComputeMove,
            Self::ExecuteMove { .. } => RequestKind::ExecuteMove,
        }
    }
}

/// Vision collaborator: reports whether the physical board changed and what
/// the move was.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Compare the physical board against the expected position and report a
    /// move candidate if one is found.
    async fn detect_move(&self, before_fen: &str) -> Result<DetectionReport, GatewayError>;
}

/// Chess-decision collaborator: produces a move for a position.
#[async_trait]
pub trait Decider: Send + Sync {
    /// Compute a move for `fen` at the given difficulty within `time_budget`.
    async fn compute_move(
        &self,
        fen: &str,
        difficulty: u8,
        time_budget: Duration,
    ) -> Result<EngineDecision, GatewayError>;
}

/// Robot-arm collaborator: physically performs a validated move.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute the move on the physical board.
    async fn execute_move(&self, command: &ExecuteCommand) -> Result<(), GatewayError>;
}
