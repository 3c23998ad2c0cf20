//! The per-game turn coordinator.
//!
//! One coordinator instance drives one game as a sequential actor: it
//! consumes events from the game's inbox one at a time, owns every mutation
//! of the [`GameState`], issues collaborator requests through the dispatcher,
//! and applies the retry/timeout/fallback policy. Because the actor is the
//! only writer, no locking is needed around the position or the move log.
//!
//! Event handling is synchronous; the actor suspends only between events.
//! A request's deadline arrives as an ordinary inbox event, and any gateway
//! answer whose correlation ID no longer matches the pending request —
//! late, duplicate, or superseded — is discarded. That single rule makes
//! duplicate delivery idempotent and late answers harmless.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::board::{BoardError, BoardPosition, MoveKind, UciMove};
use crate::config::OrchestratorConfig;
use crate::event::{GameEvent, GatewayEvent, GatewayPayload, OperatorAction};
use crate::game::{
    EndReason, GameConfig, GameFault, GamePhase, GameState, Mover, PendingRequest, ResumeAction,
};
use crate::gateway::{
    DetectionReport, EngineDecision, ExecuteCommand, GatewayDispatcher, GatewayError,
    GatewayRequest, RequestKind,
};
use crate::inbox::GameInbox;
use crate::metrics::OrchestratorMetrics;
use crate::projection::SnapshotPublisher;

/// Result of committing a move through the board model.
struct CommittedMove {
    kind: MoveKind,
    end: Option<EndReason>,
}

/// Map a detection failure to the fault raised if retries run out.
/// Timeouts and unavailability surface as the same operator fault; the
/// detector has no mechanical failure modes.
fn detection_fault(_reason: &GatewayError) -> GameFault {
    GameFault::DetectionTimeout
}

/// Map an execution failure to the fault raised if retries run out.
fn execution_fault(reason: &GatewayError) -> GameFault {
    match reason {
        GatewayError::Mechanical(fault) => (*fault).into(),
        GatewayError::Timeout => GameFault::ExecutionTimeout,
        _ => GameFault::HardwareFault,
    }
}

/// Drives a single game's state machine.
pub struct TurnCoordinator {
    state: GameState,
    config: Arc<OrchestratorConfig>,
    dispatcher: GatewayDispatcher,
    cancel: CancellationToken,
    publisher: SnapshotPublisher,
    metrics: Arc<OrchestratorMetrics>,
    /// The physical command for the execution currently in flight, kept for
    /// retries of the same move.
    current_command: Option<ExecuteCommand>,
}

impl TurnCoordinator {
    pub fn new(
        state: GameState,
        config: Arc<OrchestratorConfig>,
        dispatcher: GatewayDispatcher,
        cancel: CancellationToken,
        publisher: SnapshotPublisher,
        metrics: Arc<OrchestratorMetrics>,
    ) -> Self {
        Self {
            state,
            config,
            dispatcher,
            cancel,
            publisher,
            metrics,
            current_command: None,
        }
    }

    /// Run the game to completion (or cancellation). Returns the final state
    /// for archiving.
    pub async fn run(mut self, mut inbox: GameInbox) -> GameState {
        let cancel = self.cancel.clone();

        if self.state.phase == GamePhase::Created {
            self.begin();
        }

        loop {
            if self.state.phase.is_terminal() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(game_id = %self.state.game_id, "game actor cancelled");
                    break;
                }
                event = inbox.recv() => {
                    let Some(event) = event else { break };
                    self.handle_event(event);
                }
            }
        }

        inbox.close();
        self.state
    }

    /// Session start: route to whichever side the starting position says is
    /// to move.
    fn begin(&mut self) {
        if self.state.to_move() == self.state.engine_color {
            self.start_engine_turn();
        } else {
            self.transition(GamePhase::AwaitingHumanMove);
        }
    }

    #[instrument(skip(self, event), fields(
        game_id = %self.state.game_id,
        phase = %self.state.phase,
    ))]
    fn handle_event(&mut self, event: GameEvent) {
        match event {
            GameEvent::MoveSuspected => self.on_move_suspected(),
            GameEvent::Gateway(gateway_event) => {
                let correlation_id = gateway_event.correlation_id();
                let Some(pending) = self.take_matching_pending(correlation_id) else {
                    debug!(
                        correlation_id = %correlation_id,
                        "discarding stale or duplicate gateway event"
                    );
                    return;
                };
                match gateway_event {
                    GatewayEvent::Succeeded { payload, .. } => {
                        self.on_gateway_success(pending, payload);
                    }
                    GatewayEvent::Failed { reason, .. } => {
                        self.on_gateway_failure(pending, reason);
                    }
                }
            }
            GameEvent::DeadlineExpired { correlation_id } => {
                let Some(pending) = self.take_matching_pending(correlation_id) else {
                    debug!(
                        correlation_id = %correlation_id,
                        "discarding deadline for resolved request"
                    );
                    return;
                };
                info!(
                    correlation_id = %correlation_id,
                    kind = %pending.kind,
                    attempt = pending.attempt,
                    "request deadline expired"
                );
                self.on_gateway_failure(pending, GatewayError::Timeout);
            }
            GameEvent::Operator(action) => self.on_operator(action),
        }
    }

    /// Remove and return the pending request iff `correlation_id` matches it.
    fn take_matching_pending(&mut self, correlation_id: crate::types::CorrelationId) -> Option<PendingRequest> {
        match &self.state.pending_request {
            Some(pending) if pending.correlation_id == correlation_id => {
                self.state.pending_request.take()
            }
            _ => None,
        }
    }

    // ---- external triggers ----

    fn on_move_suspected(&mut self) {
        if self.state.phase != GamePhase::AwaitingHumanMove {
            debug!("ignoring move suspicion outside AwaitingHumanMove");
            return;
        }
        self.issue_detection(1);
        self.transition(GamePhase::ConfirmingHumanMove);
    }

    // ---- gateway completions ----

    fn on_gateway_success(&mut self, pending: PendingRequest, payload: GatewayPayload) {
        match (pending.kind, payload) {
            (RequestKind::DetectMove, GatewayPayload::Detection(report)) => {
                self.on_detection(pending, report);
            }
            (RequestKind::ComputeMove, GatewayPayload::Decision(decision)) => {
                self.on_decision(pending, decision);
            }
            (RequestKind::ExecuteMove, GatewayPayload::Execution) => {
                self.on_execution_done();
            }
            (kind, _) => {
                self.fatal(format!("gateway payload does not match request kind {kind}"));
            }
        }
    }

    fn on_gateway_failure(&mut self, pending: PendingRequest, reason: GatewayError) {
        match pending.kind {
            RequestKind::DetectMove => {
                warn!(attempt = pending.attempt, %reason, "detection attempt failed");
                self.retry_detection(pending.attempt, detection_fault(&reason));
            }
            RequestKind::ComputeMove => {
                if matches!(reason, GatewayError::NoLegalMove) {
                    // Should coincide with a terminal position; trust the
                    // board model, not the engine.
                    match self.position() {
                        Ok(position) => {
                            if let Some(outcome) = position.outcome() {
                                self.finish(outcome.into());
                                return;
                            }
                        }
                        Err(e) => {
                            self.fatal(format!("stored position unparseable: {e}"));
                            return;
                        }
                    }
                    warn!("engine reported no legal move in a non-terminal position");
                }
                warn!(attempt = pending.attempt, %reason, "engine attempt failed");
                self.retry_compute(pending.attempt);
            }
            RequestKind::ExecuteMove => {
                warn!(attempt = pending.attempt, %reason, "execution attempt failed");
                self.retry_execution(pending.attempt, execution_fault(&reason));
            }
        }
    }

    // ---- detection ----

    fn issue_detection(&mut self, attempt: u32) {
        let request = GatewayRequest::DetectMove {
            before_fen: self.state.board_fen.clone(),
        };
        self.issue(request, self.config.detection_timeout, attempt);
    }

    fn on_detection(&mut self, pending: PendingRequest, report: DetectionReport) {
        if self.state.phase != GamePhase::ConfirmingHumanMove {
            self.fatal(format!(
                "detection report delivered in phase {}",
                self.state.phase
            ));
            return;
        }

        if !report.changed {
            info!("detector saw no change; returning to wait");
            self.transition(GamePhase::AwaitingHumanMove);
            return;
        }

        let Some(candidate) = report.candidate else {
            // Board changed but no move could be reconstructed.
            self.retry_detection(pending.attempt, GameFault::LowConfidence);
            return;
        };

        let confidence = candidate.confidence.unwrap_or(0.0);
        if confidence < self.config.detection_confidence_threshold {
            info!(
                confidence,
                threshold = self.config.detection_confidence_threshold,
                "detection below confidence threshold"
            );
            self.retry_detection(pending.attempt, GameFault::LowConfidence);
            return;
        }

        self.transition(GamePhase::ApplyingHumanMove);
        match self.commit_move(Mover::Human, &candidate.uci) {
            Ok(committed) => {
                if let Some(end) = committed.end {
                    self.finish(end);
                } else {
                    self.start_engine_turn();
                }
            }
            Err(e) => {
                // The claimed move is illegal against the authoritative
                // position. Never applied; ask the detector again.
                warn!(uci = %candidate.uci, %e, "detected move rejected by board model");
                self.retry_detection(pending.attempt, GameFault::BoardMismatch);
            }
        }
    }

    fn retry_detection(&mut self, prev_attempt: u32, fault_on_exhaustion: GameFault) {
        if prev_attempt >= self.config.detection_max_attempts {
            self.pause(fault_on_exhaustion, ResumeAction::Redetect);
            return;
        }
        self.metrics.gateway_retries.inc();
        self.issue_detection(prev_attempt + 1);
        self.transition(GamePhase::ConfirmingHumanMove);
    }

    // ---- engine turn ----

    /// Difficulty and time budget for the given rung of the fallback ladder:
    /// full budget, then halved budget, then minimum difficulty as a last
    /// resort.
    fn compute_params(&self, attempt: u32) -> (u8, Duration) {
        let full = self.config.engine_time_budget;
        match attempt {
            1 => (self.state.difficulty, full),
            2 => (self.state.difficulty, full / 2),
            _ => (self.config.engine_min_difficulty, full / 2),
        }
    }

    fn start_engine_turn(&mut self) {
        self.issue_compute(1);
        self.transition(GamePhase::AwaitingEngineMove);
    }

    fn issue_compute(&mut self, attempt: u32) {
        let (difficulty, time_budget) = self.compute_params(attempt);
        let request = GatewayRequest::ComputeMove {
            fen: self.state.board_fen.clone(),
            difficulty,
            time_budget,
        };
        let deadline = time_budget + self.config.engine_deadline_grace;
        self.issue(request, deadline, attempt);
    }

    fn retry_compute(&mut self, prev_attempt: u32) {
        if prev_attempt >= self.config.engine_fallback_attempts {
            self.pause(GameFault::EngineUnavailable, ResumeAction::Recompute);
            return;
        }
        self.metrics.gateway_retries.inc();
        let (difficulty, budget) = self.compute_params(prev_attempt + 1);
        info!(
            attempt = prev_attempt + 1,
            difficulty,
            budget_ms = budget.as_millis() as u64,
            "falling back to reduced engine request"
        );
        self.issue_compute(prev_attempt + 1);
    }

    fn on_decision(&mut self, pending: PendingRequest, decision: EngineDecision) {
        if self.state.phase != GamePhase::AwaitingEngineMove {
            self.fatal(format!(
                "engine decision delivered in phase {}",
                self.state.phase
            ));
            return;
        }

        let uci = decision.candidate.uci.clone();

        // Engine moves are trusted but still checked.
        let legal = match self.position() {
            Ok(position) => position.is_legal(&uci),
            Err(e) => {
                self.fatal(format!("stored position unparseable: {e}"));
                return;
            }
        };
        if !legal {
            warn!(uci = %uci, "engine proposed an illegal move");
            self.retry_compute(pending.attempt);
            return;
        }

        self.transition(GamePhase::ApplyingEngineMove);
        match self.commit_move(Mover::Engine, &uci) {
            Ok(committed) => {
                self.state.last_evaluation = Some(decision.evaluation);
                if let Some(end) = committed.end {
                    if matches!(end, EndReason::Fatal) {
                        self.finish(end);
                        return;
                    }
                    // The mating (or drawing) move still has to be played on
                    // the physical board; finish once the arm is done.
                    self.state.deferred_end = Some(end);
                }
                let command = ExecuteCommand {
                    from: uci.from_square(),
                    to: uci.to_square(),
                    kind: committed.kind,
                };
                self.start_execution(command);
            }
            Err(e) => {
                self.fatal(format!("validated engine move failed to apply: {e}"));
            }
        }
    }

    // ---- execution ----

    fn start_execution(&mut self, command: ExecuteCommand) {
        self.current_command = Some(command.clone());
        self.issue(
            GatewayRequest::ExecuteMove { command },
            self.config.execution_timeout,
            1,
        );
        self.transition(GamePhase::ExecutingRobotMove);
    }

    fn retry_execution(&mut self, prev_attempt: u32, fault_on_exhaustion: GameFault) {
        // The in-flight physical action has now completed or failed; a parked
        // terminal request takes precedence over retrying.
        if let Some(end) = self.state.deferred_end.take() {
            self.finish(end);
            return;
        }

        let Some(command) = self.current_command.clone() else {
            self.fatal("execution failure with no current command".to_string());
            return;
        };

        if prev_attempt >= self.config.execution_max_attempts {
            // The move stays committed: digital state is authoritative and
            // ahead of physical reality until the operator reconciles.
            self.pause(fault_on_exhaustion, ResumeAction::Reexecute { command });
            return;
        }
        self.metrics.gateway_retries.inc();
        self.issue(
            GatewayRequest::ExecuteMove { command },
            self.config.execution_timeout,
            prev_attempt + 1,
        );
    }

    fn on_execution_done(&mut self) {
        self.current_command = None;
        if let Some(end) = self.state.deferred_end.take() {
            self.finish(end);
            return;
        }
        self.transition(GamePhase::AwaitingHumanMove);
    }

    // ---- operator actions ----

    fn on_operator(&mut self, action: OperatorAction) {
        match action {
            OperatorAction::Resume => self.on_resume(),
            OperatorAction::Abort => self.request_end(EndReason::Aborted),
            OperatorAction::Resign => self.request_end(EndReason::Resignation {
                winner: self.state.engine_color,
            }),
            OperatorAction::SetDifficulty(level) => self.on_set_difficulty(level),
        }
    }

    fn on_resume(&mut self) {
        if self.state.phase != GamePhase::Paused {
            debug!("ignoring resume outside Paused");
            return;
        }
        self.state.fault = None;
        match self.state.resume_action.take() {
            Some(ResumeAction::Redetect) => {
                self.issue_detection(1);
                self.transition(GamePhase::ConfirmingHumanMove);
            }
            Some(ResumeAction::Recompute) => {
                self.issue_compute(1);
                self.transition(GamePhase::AwaitingEngineMove);
            }
            Some(ResumeAction::Reexecute { command }) => {
                self.current_command = Some(command.clone());
                self.issue(
                    GatewayRequest::ExecuteMove { command },
                    self.config.execution_timeout,
                    1,
                );
                self.transition(GamePhase::ExecutingRobotMove);
            }
            None => {
                // Nothing was pending when the game paused; wait for the
                // human again.
                self.transition(GamePhase::AwaitingHumanMove);
            }
        }
    }

    /// Honor a terminal request, deferring it while the robot is mid-move:
    /// the arm is never left unattended in the middle of a trajectory.
    fn request_end(&mut self, end: EndReason) {
        if self.state.phase == GamePhase::ExecutingRobotMove {
            info!(?end, "deferring terminal request until execution resolves");
            self.state.deferred_end = Some(end);
            return;
        }
        self.finish(end);
    }

    fn on_set_difficulty(&mut self, level: u8) {
        let computing = self
            .state
            .pending_request
            .as_ref()
            .is_some_and(|p| p.kind == RequestKind::ComputeMove);
        if computing {
            warn!("rejecting difficulty change while engine request is in flight");
            return;
        }
        self.state.difficulty = level.clamp(1, GameConfig::MAX_DIFFICULTY);
        info!(difficulty = self.state.difficulty, "difficulty updated");
        self.emit();
    }

    // ---- commit, pause, finish ----

    /// Validate a move against the authoritative position and, if legal,
    /// append it to the move log and advance the position. Nothing is
    /// mutated on rejection.
    fn commit_move(&mut self, mover: Mover, uci: &UciMove) -> Result<CommittedMove, BoardError> {
        let mut position = self.position()?;
        let color = position.turn();
        let kind = position.classify(uci)?;
        let san = position.apply(uci)?;
        let fen_after = position.to_fen();

        self.state.move_log.push(crate::game::MoveRecord {
            mover,
            color,
            uci: uci.clone(),
            san: san.clone(),
            kind,
            fen_after: fen_after.clone(),
            committed_at: Utc::now(),
        });
        self.state.board_fen = fen_after;
        self.metrics.moves_committed.inc();

        info!(
            %mover,
            %color,
            %uci,
            %san,
            move_count = self.state.move_log.len(),
            "move committed"
        );

        if let Err(detail) = self.state.check_invariants() {
            // Surfaced by the caller through the returned end reason instead
            // of continuing in an unknown state.
            self.state.fault = Some(GameFault::InternalDefect {
                detail: detail.clone(),
            });
            error!(%detail, "invariant violation after commit");
            return Ok(CommittedMove {
                kind,
                end: Some(EndReason::Fatal),
            });
        }

        Ok(CommittedMove {
            kind,
            end: position.outcome().map(EndReason::from),
        })
    }

    fn pause(&mut self, fault: GameFault, resume: ResumeAction) {
        warn!(?fault, "pausing game: {}", fault.operator_message());
        self.metrics.faults_raised.inc();
        self.state.fault = Some(fault);
        self.state.resume_action = Some(resume);
        self.transition(GamePhase::Paused);
    }

    fn finish(&mut self, end: EndReason) {
        info!(?end, "game over");
        self.state.pending_request = None;
        self.current_command = None;
        self.state.deferred_end = None;
        self.state.end_reason = Some(end);
        self.state.finished_at = Some(Utc::now());
        self.metrics.games_finished.inc();
        self.transition(GamePhase::GameOver);
    }

    fn fatal(&mut self, detail: String) {
        error!(%detail, "internal defect; forcing game over");
        self.state.fault = Some(GameFault::InternalDefect { detail });
        self.finish(EndReason::Fatal);
    }

    // ---- plumbing ----

    fn position(&self) -> Result<BoardPosition, BoardError> {
        BoardPosition::from_fen(&self.state.board_fen)
    }

    fn issue(&mut self, request: GatewayRequest, deadline: Duration, attempt: u32) {
        let kind = request.kind();
        let correlation_id = self.dispatcher.issue(request, deadline);
        self.state.pending_request = Some(PendingRequest {
            correlation_id,
            kind,
            issued_at: Utc::now(),
            deadline,
            attempt,
        });
    }

    fn transition(&mut self, phase: GamePhase) {
        debug!(from = %self.state.phase, to = %phase, "phase transition");
        self.state.phase = phase;
        self.emit();
    }

    fn emit(&self) {
        self.publisher.publish(self.state.snapshot());
    }
}
