//! Events consumed by a game's turn coordinator.
//!
//! Everything that can wake a game — gateway completions, deadline expiries,
//! the vision system's "something moved" push signal, and operator actions —
//! arrives through the same ordered inbox, so ordering and idempotence are
//! enforced structurally rather than by convention.

use crate::gateway::{DetectionReport, EngineDecision, GatewayError};
use crate::types::CorrelationId;

/// Successful payload of a completed gateway request.
#[derive(Debug, Clone)]
pub enum GatewayPayload {
    /// Detector result.
    Detection(DetectionReport),
    /// Decider result.
    Decision(EngineDecision),
    /// Executor completed the physical move.
    Execution,
}

/// Terminal event a gateway deposits for an issued request.
///
/// Exactly one of these is produced per request — or none, if the
/// collaborator never answers, in which case the coordinator's own
/// [`GameEvent::DeadlineExpired`] timer is authoritative.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// The collaborator finished successfully.
    Succeeded {
        correlation_id: CorrelationId,
        payload: GatewayPayload,
    },
    /// The collaborator reported a typed failure.
    Failed {
        correlation_id: CorrelationId,
        reason: GatewayError,
    },
}

impl GatewayEvent {
    /// The correlation ID this event answers.
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            Self::Succeeded { correlation_id, .. } | Self::Failed { correlation_id, .. } => {
                *correlation_id
            }
        }
    }
}

/// Explicit operator/user actions on a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorAction {
    /// Resume a paused game; re-issues the request that was pending.
    Resume,
    /// Abort the game.
    Abort,
    /// The human resigns.
    Resign,
    /// Change engine strength. Applied between moves only.
    SetDifficulty(u8),
}

/// Anything that can arrive on a game's inbox.
#[derive(Debug, Clone)]
pub enum GameEvent {
    /// The vision collaborator suspects the human moved.
    MoveSuspected,
    /// A gateway deposited a terminal result.
    Gateway(GatewayEvent),
    /// The coordinator's own deadline for a request fired.
    DeadlineExpired { correlation_id: CorrelationId },
    /// An operator/user action.
    Operator(OperatorAction),
}
