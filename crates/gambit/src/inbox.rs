//! Per-game event channel.
//!
//! One inbox per game gives the coordinator a strictly ordered event stream:
//! the single mpsc channel preserves arrival order, and the single consuming
//! actor processes one event at a time. Delivery is at-least-once from the
//! senders' point of view — gateways, timers, and external callers may all
//! race or redeliver — so the coordinator discards anything whose correlation
//! ID no longer matches its pending request.

use tokio::sync::mpsc;
use tracing::debug;

use crate::event::GameEvent;
use crate::types::GameId;

/// Cloneable sending half of a game's inbox.
#[derive(Clone)]
pub struct InboxSender {
    game_id: GameId,
    tx: mpsc::UnboundedSender<GameEvent>,
}

impl InboxSender {
    /// Deposit an event. Events for a dead game are dropped silently: late
    /// gateway answers and timer expiries after termination are expected.
    pub fn publish(&self, event: GameEvent) {
        if self.tx.send(event).is_err() {
            debug!(game_id = %self.game_id, "dropping event for terminated game");
        }
    }

    /// Whether the receiving actor is still alive.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Receiving half, owned by the game's coordinator.
pub struct GameInbox {
    rx: mpsc::UnboundedReceiver<GameEvent>,
}

impl GameInbox {
    /// Receive the next event in arrival order. `None` once all senders are
    /// gone.
    pub async fn recv(&mut self) -> Option<GameEvent> {
        self.rx.recv().await
    }

    /// Stop accepting new events.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Create the inbox pair for a game.
#[must_use]
pub fn channel(game_id: GameId) -> (InboxSender, GameInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboxSender { game_id, tx }, GameInbox { rx })
}
