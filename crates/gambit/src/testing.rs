//! Scripted in-memory collaborators for unit and integration testing.
//!
//! Each fake pops the next step from a queue on every call, so tests spell
//! out exactly what the camera, engine, and arm do, in order. A `Hang` step
//! never answers — the coordinator's own deadline timer resolves it — which
//! is how timeout and late-answer behavior is exercised under paused time.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::seq::SliceRandom;

use crate::board::{BoardPosition, UciMove};
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::game::{GameConfig, GamePhase, GameSnapshot};
use crate::gateway::dispatch::Collaborators;
use crate::gateway::{
    Decider, DetectionReport, Detector, EngineDecision, EngineEvaluation, ExecuteCommand,
    Executor, GatewayError, MoveCandidate,
};
use crate::registry::SessionRegistry;
use crate::types::GameId;

/// Wrap three concrete collaborators into the dispatcher's bundle.
pub fn collaborators(
    detector: impl Detector + 'static,
    decider: impl Decider + 'static,
    executor: impl Executor + 'static,
) -> Collaborators {
    Collaborators {
        detector: Arc::new(detector),
        decider: Arc::new(decider),
        executor: Arc::new(executor),
    }
}

/// One scripted detector response.
#[derive(Debug, Clone)]
pub enum DetectorStep {
    /// Answer with this report.
    Report(DetectionReport),
    /// Answer with this report after a delay (for late-answer tests).
    Delayed(DetectionReport, Duration),
    /// Fail with this error.
    Fail(GatewayError),
    /// Never answer; the coordinator's deadline resolves the request.
    Hang,
}

/// Detector that replays a script. An exhausted script hangs.
#[derive(Default)]
pub struct ScriptedDetector {
    steps: Mutex<VecDeque<DetectorStep>>,
    calls: Mutex<usize>,
}

impl ScriptedDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw step.
    pub fn push(&self, step: DetectorStep) {
        self.steps.lock().push_back(step);
    }

    /// Append a successful detection of `uci` at `confidence`.
    pub fn push_move(&self, uci: &str, confidence: f64) {
        self.push(DetectorStep::Report(DetectionReport::moved(
            UciMove::new(uci).expect("valid test move"),
            confidence,
        )));
    }

    /// Append a "nothing changed" report.
    pub fn push_unchanged(&self) {
        self.push(DetectorStep::Report(DetectionReport::unchanged()));
    }

    /// Append a never-answering step.
    pub fn push_hang(&self) {
        self.push(DetectorStep::Hang);
    }

    /// How many times `detect_move` was called.
    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn detect_move(&self, _before_fen: &str) -> Result<DetectionReport, GatewayError> {
        *self.calls.lock() += 1;
        let step = self.steps.lock().pop_front();
        match step {
            Some(DetectorStep::Report(report)) => Ok(report),
            Some(DetectorStep::Delayed(report, delay)) => {
                tokio::time::sleep(delay).await;
                Ok(report)
            }
            Some(DetectorStep::Fail(reason)) => Err(reason),
            Some(DetectorStep::Hang) | None => std::future::pending().await,
        }
    }
}

/// One scripted decider response.
#[derive(Debug, Clone)]
pub enum DeciderStep {
    /// Answer with this move (flat evaluation).
    Move(UciMove),
    /// Answer with a full decision.
    Decision(EngineDecision),
    /// Fail with this error.
    Fail(GatewayError),
    /// Never answer.
    Hang,
}

/// Decider that replays a script and records every request's parameters.
/// An exhausted script hangs.
#[derive(Default)]
pub struct ScriptedDecider {
    steps: Mutex<VecDeque<DeciderStep>>,
    requests: Mutex<Vec<(u8, Duration)>>,
}

impl ScriptedDecider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, step: DeciderStep) {
        self.steps.lock().push_back(step);
    }

    /// Append a move answer.
    pub fn push_move(&self, uci: &str) {
        self.push(DeciderStep::Move(
            UciMove::new(uci).expect("valid test move"),
        ));
    }

    /// Append a never-answering step.
    pub fn push_hang(&self) {
        self.push(DeciderStep::Hang);
    }

    /// `(difficulty, time_budget)` of every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<(u8, Duration)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Decider for ScriptedDecider {
    async fn compute_move(
        &self,
        _fen: &str,
        difficulty: u8,
        time_budget: Duration,
    ) -> Result<EngineDecision, GatewayError> {
        self.requests.lock().push((difficulty, time_budget));
        let step = self.steps.lock().pop_front();
        match step {
            Some(DeciderStep::Move(uci)) => Ok(EngineDecision {
                candidate: MoveCandidate::from_engine(uci),
                evaluation: EngineEvaluation {
                    score_cp: 0,
                    depth: 1,
                    principal_variation: Vec::new(),
                },
            }),
            Some(DeciderStep::Decision(decision)) => Ok(decision),
            Some(DeciderStep::Fail(reason)) => Err(reason),
            Some(DeciderStep::Hang) | None => std::future::pending().await,
        }
    }
}

/// Decider that plays the first legal move. Deterministic; useful for longer
/// sequences where the exact moves don't matter.
pub struct FirstLegalDecider;

#[async_trait]
impl Decider for FirstLegalDecider {
    async fn compute_move(
        &self,
        fen: &str,
        _difficulty: u8,
        _time_budget: Duration,
    ) -> Result<EngineDecision, GatewayError> {
        let position = BoardPosition::from_fen(fen).map_err(|e| GatewayError::Unavailable {
            reason: e.to_string(),
        })?;
        let legal = position.legal_moves();
        let first = legal.first().ok_or(GatewayError::NoLegalMove)?;
        let uci = UciMove::new(first.uci.clone()).map_err(|e| GatewayError::Unavailable {
            reason: e.to_string(),
        })?;
        Ok(EngineDecision {
            candidate: MoveCandidate::from_engine(uci),
            evaluation: EngineEvaluation {
                score_cp: 0,
                depth: 1,
                principal_variation: Vec::new(),
            },
        })
    }
}

/// Decider that plays a uniformly random legal move.
pub struct RandomDecider;

#[async_trait]
impl Decider for RandomDecider {
    async fn compute_move(
        &self,
        fen: &str,
        _difficulty: u8,
        _time_budget: Duration,
    ) -> Result<EngineDecision, GatewayError> {
        let position = BoardPosition::from_fen(fen).map_err(|e| GatewayError::Unavailable {
            reason: e.to_string(),
        })?;
        let legal = position.legal_moves();
        let pick = legal
            .choose(&mut rand::thread_rng())
            .ok_or(GatewayError::NoLegalMove)?;
        let uci = UciMove::new(pick.uci.clone()).map_err(|e| GatewayError::Unavailable {
            reason: e.to_string(),
        })?;
        Ok(EngineDecision {
            candidate: MoveCandidate::from_engine(uci),
            evaluation: EngineEvaluation {
                score_cp: 0,
                depth: 1,
                principal_variation: Vec::new(),
            },
        })
    }
}

/// One scripted executor response.
#[derive(Debug, Clone)]
pub enum ExecutorStep {
    /// Complete the physical move.
    Succeed,
    /// Fail with this error.
    Fail(GatewayError),
    /// Never answer.
    Hang,
}

/// Executor that replays a script and records every command it received.
/// An exhausted script succeeds.
#[derive(Default)]
pub struct ScriptedExecutor {
    steps: Mutex<VecDeque<ExecutorStep>>,
    executed: Mutex<Vec<ExecuteCommand>>,
}

impl ScriptedExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, step: ExecutorStep) {
        self.steps.lock().push_back(step);
    }

    /// Append `count` mechanical failures.
    pub fn push_failures(&self, reason: GatewayError, count: usize) {
        for _ in 0..count {
            self.push(ExecutorStep::Fail(reason.clone()));
        }
    }

    /// Every command received, in order (including retried attempts).
    #[must_use]
    pub fn executed(&self) -> Vec<ExecuteCommand> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute_move(&self, command: &ExecuteCommand) -> Result<(), GatewayError> {
        self.executed.lock().push(command.clone());
        let step = self.steps.lock().pop_front();
        match step {
            Some(ExecutorStep::Succeed) | None => Ok(()),
            Some(ExecutorStep::Fail(reason)) => Err(reason),
            Some(ExecutorStep::Hang) => std::future::pending().await,
        }
    }
}

/// A registry wired to scripted collaborators, with handles kept for
/// scripting and inspection.
pub struct TestRig {
    pub registry: SessionRegistry,
    pub detector: Arc<ScriptedDetector>,
    pub decider: Arc<ScriptedDecider>,
    pub executor: Arc<ScriptedExecutor>,
}

impl TestRig {
    /// Rig with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    /// Rig with custom configuration.
    #[must_use]
    pub fn with_config(config: OrchestratorConfig) -> Self {
        let detector = Arc::new(ScriptedDetector::new());
        let decider = Arc::new(ScriptedDecider::new());
        let executor = Arc::new(ScriptedExecutor::new());
        let registry = SessionRegistry::new(
            config,
            Collaborators {
                detector: Arc::clone(&detector) as Arc<dyn Detector>,
                decider: Arc::clone(&decider) as Arc<dyn Decider>,
                executor: Arc::clone(&executor) as Arc<dyn Executor>,
            },
        )
        .expect("test config is valid");
        Self {
            registry,
            detector,
            decider,
            executor,
        }
    }

    /// Create a game on a fresh board.
    pub fn create_game(
        &self,
        board: &str,
        game_config: &GameConfig,
    ) -> Result<GameId, OrchestratorError> {
        self.registry
            .create(crate::types::BoardId::new(board), game_config)
    }

    /// Wait until the game's snapshot satisfies `predicate`. Panics if the
    /// game ends first without satisfying it.
    pub async fn wait_until(
        &self,
        game_id: GameId,
        predicate: impl Fn(&GameSnapshot) -> bool,
    ) -> GameSnapshot {
        let Some(mut rx) = self.registry.watch(game_id) else {
            let snapshot = self.registry.get_status(game_id).expect("game exists");
            assert!(
                predicate(&snapshot),
                "game already finished in phase {} without satisfying predicate",
                snapshot.phase
            );
            return snapshot;
        };

        loop {
            let snapshot = rx.borrow_and_update().clone();
            if predicate(&snapshot) {
                return snapshot;
            }
            if rx.changed().await.is_err() {
                let snapshot = self.registry.get_status(game_id).expect("game exists");
                assert!(
                    predicate(&snapshot),
                    "game finished in phase {} without satisfying predicate",
                    snapshot.phase
                );
                return snapshot;
            }
        }
    }

    /// Wait until the game reaches `phase`.
    pub async fn wait_for_phase(&self, game_id: GameId, phase: GamePhase) -> GameSnapshot {
        self.wait_until(game_id, |snapshot| snapshot.phase == phase)
            .await
    }
}

impl Default for TestRig {
    fn default() -> Self {
        Self::new()
    }
}
