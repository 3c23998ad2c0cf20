//! Session registry: one live game per physical board.
//!
//! The registry owns the board-claim map and the lifecycle of each game's
//! actor task. A claim is taken atomically at creation and released by the
//! actor's cleanup when the game reaches a terminal phase, so at most one
//! non-terminal game can ever exist per board. Terminated games are archived,
//! not deleted.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::OrchestratorConfig;
use crate::coordinator::TurnCoordinator;
use crate::error::OrchestratorError;
use crate::event::{GameEvent, OperatorAction};
use crate::game::{GameConfig, GameSnapshot, GameState};
use crate::gateway::dispatch::Collaborators;
use crate::gateway::GatewayDispatcher;
use crate::inbox::{self, InboxSender};
use crate::metrics::OrchestratorMetrics;
use crate::projection::{SnapshotFeed, SnapshotPublisher};
use crate::types::{BoardId, GameId};

/// A live game's control surface.
struct GameHandle {
    board_id: BoardId,
    inbox: InboxSender,
    watch: watch::Receiver<GameSnapshot>,
    cancel: CancellationToken,
    /// Stored synchronously right after spawn so shutdown can await the
    /// actor task.
    join: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    config: Arc<OrchestratorConfig>,
    collaborators: Collaborators,
    games: DashMap<GameId, Arc<GameHandle>>,
    boards: DashMap<BoardId, GameId>,
    archive: DashMap<GameId, GameState>,
    feed: SnapshotFeed,
    metrics: Arc<OrchestratorMetrics>,
}

/// Tracks all games across boards and enforces the one-live-game-per-board
/// rule.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl SessionRegistry {
    /// Create a registry with unregistered metrics.
    pub fn new(
        config: OrchestratorConfig,
        collaborators: Collaborators,
    ) -> Result<Self, OrchestratorError> {
        Self::with_metrics(config, collaborators, OrchestratorMetrics::unregistered())
    }

    /// Create a registry with the given metrics.
    pub fn with_metrics(
        config: OrchestratorConfig,
        collaborators: Collaborators,
        metrics: OrchestratorMetrics,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        let feed = SnapshotFeed::new(config.snapshot_feed_capacity);
        Ok(Self {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                collaborators,
                games: DashMap::new(),
                boards: DashMap::new(),
                archive: DashMap::new(),
                feed,
                metrics: Arc::new(metrics),
            }),
        })
    }

    /// Create a new game on a board. Fails if the board already has a live
    /// game.
    #[instrument(skip(self, game_config), fields(board_id = %board_id))]
    pub fn create(
        &self,
        board_id: BoardId,
        game_config: &GameConfig,
    ) -> Result<GameId, OrchestratorError> {
        let game_id = GameId::new();
        let state = GameState::new(game_id, board_id.clone(), game_config)?;

        self.claim_board(board_id, game_id)?;
        self.spawn(state);
        info!(game_id = %game_id, "game created");
        Ok(game_id)
    }

    /// Re-adopt a game recovered from durable storage.
    ///
    /// A recovered game that was awaiting a collaborator is demoted to
    /// `Paused` with a `RecoveryRequired` fault: the physical board cannot be
    /// trusted across a restart, so the operator confirms it before anything
    /// is re-issued. Terminal games go straight to the archive.
    #[instrument(skip(self, state), fields(game_id = %state.game_id, board_id = %state.board_id))]
    pub fn restore(&self, mut state: GameState) -> Result<GameId, OrchestratorError> {
        let game_id = state.game_id;
        if state.phase.is_terminal() {
            self.inner.archive.insert(game_id, state);
            return Ok(game_id);
        }

        self.claim_board(state.board_id.clone(), game_id)?;
        if state.normalize_for_recovery() {
            warn!("recovered game had a request in flight; pausing for operator confirmation");
        }
        self.spawn(state);
        Ok(game_id)
    }

    /// Latest snapshot of a live or archived game.
    pub fn get_status(&self, game_id: GameId) -> Result<GameSnapshot, OrchestratorError> {
        if let Some(handle) = self.inner.games.get(&game_id) {
            return Ok(handle.watch.borrow().clone());
        }
        if let Some(state) = self.inner.archive.get(&game_id) {
            return Ok(state.snapshot());
        }
        Err(OrchestratorError::GameNotFound { game_id })
    }

    /// Watch handle for a live game's snapshots.
    #[must_use]
    pub fn watch(&self, game_id: GameId) -> Option<watch::Receiver<GameSnapshot>> {
        self.inner
            .games
            .get(&game_id)
            .map(|handle| handle.watch.clone())
    }

    /// Subscribe to every committed transition across all games.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GameSnapshot> {
        self.inner.feed.subscribe()
    }

    /// Signal from the vision layer that the human may have moved.
    pub fn notify_move_suspected(&self, game_id: GameId) -> Result<(), OrchestratorError> {
        self.publish(game_id, GameEvent::MoveSuspected)
    }

    /// Submit an operator/user action (resume, abort, resign, difficulty).
    pub fn submit(
        &self,
        game_id: GameId,
        action: OperatorAction,
    ) -> Result<(), OrchestratorError> {
        self.publish(game_id, GameEvent::Operator(action))
    }

    /// Terminate a game. Idempotent for games that already ended.
    pub fn terminate(&self, game_id: GameId) -> Result<(), OrchestratorError> {
        match self.publish(game_id, GameEvent::Operator(OperatorAction::Abort)) {
            Ok(()) => Ok(()),
            Err(OrchestratorError::GameNotFound { .. })
                if self.inner.archive.contains_key(&game_id) =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Raw event sender for a live game. Used by gateway harnesses and tests
    /// to deposit events; the bus is at-least-once, so redelivery through
    /// this path is always safe.
    #[must_use]
    pub fn event_sender(&self, game_id: GameId) -> Option<InboxSender> {
        self.inner
            .games
            .get(&game_id)
            .map(|handle| handle.inbox.clone())
    }

    /// Number of live games.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.games.len()
    }

    /// Cancel all live game actors and wait for them to exit.
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<GameHandle>> = self
            .inner
            .games
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for handle in &handles {
            handle.cancel.cancel();
        }

        let mut joins = Vec::new();
        for handle in &handles {
            if let Some(join) = handle.join.lock().take() {
                joins.push(join);
            }
        }
        if joins.is_empty() {
            return;
        }

        let all = futures::future::join_all(joins);
        if tokio::time::timeout(Duration::from_secs(5), all).await.is_err() {
            warn!("timed out waiting for game actors to exit");
        }
    }

    fn claim_board(&self, board_id: BoardId, game_id: GameId) -> Result<(), OrchestratorError> {
        match self.inner.boards.entry(board_id.clone()) {
            Entry::Occupied(_) => Err(OrchestratorError::BoardAlreadyActive { board_id }),
            Entry::Vacant(vacant) => {
                vacant.insert(game_id);
                Ok(())
            }
        }
    }

    fn publish(&self, game_id: GameId, event: GameEvent) -> Result<(), OrchestratorError> {
        let handle = self
            .inner
            .games
            .get(&game_id)
            .ok_or(OrchestratorError::GameNotFound { game_id })?;
        if !handle.inbox.is_open() {
            return Err(OrchestratorError::GameClosed { game_id });
        }
        handle.inbox.publish(event);
        Ok(())
    }

    fn spawn(&self, state: GameState) {
        let game_id = state.game_id;
        let board_id = state.board_id.clone();

        let (inbox_tx, inbox_rx) = inbox::channel(game_id);
        let dispatcher =
            GatewayDispatcher::new(self.inner.collaborators.clone(), inbox_tx.clone());
        let (publisher, watch_rx) =
            SnapshotPublisher::new(state.snapshot(), self.inner.feed.clone());
        let cancel = CancellationToken::new();

        let coordinator = TurnCoordinator::new(
            state,
            Arc::clone(&self.inner.config),
            dispatcher,
            cancel.clone(),
            publisher,
            Arc::clone(&self.inner.metrics),
        );

        let handle = Arc::new(GameHandle {
            board_id: board_id.clone(),
            inbox: inbox_tx,
            watch: watch_rx,
            cancel,
            join: parking_lot::Mutex::new(None),
        });

        // Insert before spawning so the actor's cleanup always finds the
        // entry it removes.
        self.inner.games.insert(game_id, Arc::clone(&handle));
        self.inner.metrics.games_active.inc();

        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(async move {
            let final_state = coordinator.run(inbox_rx).await;
            info!(
                game_id = %game_id,
                phase = %final_state.phase,
                "game actor finished"
            );
            // Archive first so status queries never observe a gap.
            inner.archive.insert(game_id, final_state);
            inner
                .boards
                .remove_if(&board_id, |_, active| *active == game_id);
            inner.games.remove(&game_id);
            inner.metrics.games_active.dec();
        });

        // The handle Arc is held here regardless of map removal, so storing
        // the JoinHandle after spawn cannot race with actor cleanup.
        *handle.join.lock() = Some(join);
    }
}
