//! Turns collaborator requests into inbox events.
//!
//! The dispatcher owns the asynchrony at the gateway boundary: `issue`
//! returns immediately with a correlation ID, one spawned task makes the
//! single trait call and deposits exactly one terminal [`GatewayEvent`], and
//! an independent timer task deposits [`GameEvent::DeadlineExpired`] when the
//! coordinator's deadline passes. Whichever arrives first wins at the
//! coordinator; the loser is discarded there by correlation-ID mismatch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::event::{GameEvent, GatewayEvent, GatewayPayload};
use crate::gateway::{Decider, Detector, Executor, GatewayError, GatewayRequest};
use crate::inbox::InboxSender;
use crate::types::CorrelationId;

/// The three collaborator endpoints a game talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub detector: Arc<dyn Detector>,
    pub decider: Arc<dyn Decider>,
    pub executor: Arc<dyn Executor>,
}

/// Issues collaborator requests on behalf of one game.
pub struct GatewayDispatcher {
    collaborators: Collaborators,
    /// Hardware mutual exclusion: at most one physical move may be in flight
    /// against the robot serving this board, regardless of what the caller
    /// does. One permit, acquired inside the execute task.
    robot_lock: Arc<Semaphore>,
    inbox: InboxSender,
}

impl GatewayDispatcher {
    /// Create a dispatcher for one game/board.
    pub fn new(collaborators: Collaborators, inbox: InboxSender) -> Self {
        Self {
            collaborators,
            robot_lock: Arc::new(Semaphore::new(1)),
            inbox,
        }
    }

    /// Hand a request to its collaborator and start the deadline timer.
    ///
    /// Non-blocking: the request runs in spawned tasks. Returns the
    /// correlation ID the resulting events will carry.
    pub fn issue(&self, request: GatewayRequest, deadline: Duration) -> CorrelationId {
        let correlation_id = CorrelationId::new();
        debug!(
            correlation_id = %correlation_id,
            kind = %request.kind(),
            deadline_ms = deadline.as_millis() as u64,
            "issuing collaborator request"
        );

        let timer_inbox = self.inbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            timer_inbox.publish(GameEvent::DeadlineExpired { correlation_id });
        });

        let inbox = self.inbox.clone();
        let collaborators = self.collaborators.clone();
        let robot_lock = Arc::clone(&self.robot_lock);
        tokio::spawn(async move {
            let outcome = match request {
                GatewayRequest::DetectMove { before_fen } => collaborators
                    .detector
                    .detect_move(&before_fen)
                    .await
                    .map(GatewayPayload::Detection),
                GatewayRequest::ComputeMove {
                    fen,
                    difficulty,
                    time_budget,
                } => collaborators
                    .decider
                    .compute_move(&fen, difficulty, time_budget)
                    .await
                    .map(GatewayPayload::Decision),
                GatewayRequest::ExecuteMove { command } => {
                    match robot_lock.acquire_owned().await {
                        Ok(_permit) => collaborators
                            .executor
                            .execute_move(&command)
                            .await
                            .map(|()| GatewayPayload::Execution),
                        Err(_) => Err(GatewayError::Unavailable {
                            reason: "robot lock closed".to_string(),
                        }),
                    }
                }
            };

            let event = match outcome {
                Ok(payload) => GatewayEvent::Succeeded {
                    correlation_id,
                    payload,
                },
                Err(reason) => GatewayEvent::Failed {
                    correlation_id,
                    reason,
                },
            };
            inbox.publish(GameEvent::Gateway(event));
        });

        correlation_id
    }
}
