use std::time::Duration;

use crate::error::OrchestratorError;

/// Configuration for the match orchestrator.
///
/// The retry bounds and deadlines here are policy knobs: the state machine
/// fixes their role, operators tune the values per installation.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline for a single `detect_move` request. Default: 10s.
    pub detection_timeout: Duration,
    /// Minimum detector confidence for a candidate to be considered.
    /// Default: 0.85.
    pub detection_confidence_threshold: f64,
    /// Maximum detection attempts (timeouts, low confidence, or illegal
    /// candidates) for one awaited move before the game pauses. Default: 3.
    pub detection_max_attempts: u32,
    /// Time budget handed to the engine on the first attempt. Default: 30s.
    pub engine_time_budget: Duration,
    /// Extra grace on top of the engine's budget before the orchestrator's
    /// own deadline fires. Default: 5s.
    pub engine_deadline_grace: Duration,
    /// Number of rungs on the engine fallback ladder (full budget, halved
    /// budget, minimum difficulty). Default: 3.
    pub engine_fallback_attempts: u32,
    /// Difficulty used by the last-resort fallback request. Default: 1.
    pub engine_min_difficulty: u8,
    /// Deadline for a single `execute_move` request. Default: 45s.
    pub execution_timeout: Duration,
    /// Maximum physical attempts for one move before the game pauses.
    /// Default: 3.
    pub execution_max_attempts: u32,
    /// Capacity of the registry-wide snapshot broadcast feed. Default: 256.
    pub snapshot_feed_capacity: usize,
}

impl OrchestratorConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.detection_timeout.is_zero() {
            return Err(OrchestratorError::InvalidConfig {
                reason: "detection_timeout must be > 0".to_string(),
            });
        }
        if !(self.detection_confidence_threshold > 0.0
            && self.detection_confidence_threshold <= 1.0)
        {
            return Err(OrchestratorError::InvalidConfig {
                reason: format!(
                    "detection_confidence_threshold must be in (0, 1], got {}",
                    self.detection_confidence_threshold
                ),
            });
        }
        if self.detection_max_attempts == 0 {
            return Err(OrchestratorError::InvalidConfig {
                reason: "detection_max_attempts must be >= 1".to_string(),
            });
        }
        if self.engine_time_budget.is_zero() {
            return Err(OrchestratorError::InvalidConfig {
                reason: "engine_time_budget must be > 0".to_string(),
            });
        }
        if self.engine_fallback_attempts == 0 {
            return Err(OrchestratorError::InvalidConfig {
                reason: "engine_fallback_attempts must be >= 1".to_string(),
            });
        }
        if self.engine_min_difficulty == 0 {
            return Err(OrchestratorError::InvalidConfig {
                reason: "engine_min_difficulty must be >= 1".to_string(),
            });
        }
        if self.execution_timeout.is_zero() {
            return Err(OrchestratorError::InvalidConfig {
                reason: "execution_timeout must be > 0".to_string(),
            });
        }
        if self.execution_max_attempts == 0 {
            return Err(OrchestratorError::InvalidConfig {
                reason: "execution_max_attempts must be >= 1".to_string(),
            });
        }
        if self.snapshot_feed_capacity == 0 {
            return Err(OrchestratorError::InvalidConfig {
                reason: "snapshot_feed_capacity must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            detection_timeout: Duration::from_secs(10),
            detection_confidence_threshold: 0.85,
            detection_max_attempts: 3,
            engine_time_budget: Duration::from_secs(30),
            engine_deadline_grace: Duration::from_secs(5),
            engine_fallback_attempts: 3,
            engine_min_difficulty: 1,
            execution_timeout: Duration::from_secs(45),
            execution_max_attempts: 3,
            snapshot_feed_capacity: 256,
        }
    }
}
