//! Outbound snapshot channels.
//!
//! Every committed transition is mirrored outward as a read-only
//! [`GameSnapshot`]: a per-game `watch` always holds the latest snapshot (for
//! status queries), and a registry-wide `broadcast` feed carries every
//! transition for UI/API consumers. The core has no dependency on how either
//! is rendered or transported.

use tokio::sync::{broadcast, watch};
use tracing::trace;

use crate::game::GameSnapshot;

/// Registry-wide feed of committed transitions across all games.
#[derive(Clone)]
pub struct SnapshotFeed {
    tx: broadcast::Sender<GameSnapshot>,
}

impl SnapshotFeed {
    /// Create a feed with the given buffer capacity. Slow consumers that fall
    /// more than `capacity` snapshots behind observe a lag error, never a
    /// stalled orchestrator.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future committed transitions.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GameSnapshot> {
        self.tx.subscribe()
    }

    /// Publish a snapshot. A feed with no subscribers is not an error.
    pub fn publish(&self, snapshot: GameSnapshot) {
        if self.tx.send(snapshot).is_err() {
            trace!("snapshot feed has no subscribers");
        }
    }
}

/// Per-game publisher: latest-value watch plus the shared feed.
pub struct SnapshotPublisher {
    watch_tx: watch::Sender<GameSnapshot>,
    feed: SnapshotFeed,
}

impl SnapshotPublisher {
    /// Create a publisher seeded with the game's initial snapshot. Returns
    /// the watch handle status queries read from.
    #[must_use]
    pub fn new(initial: GameSnapshot, feed: SnapshotFeed) -> (Self, watch::Receiver<GameSnapshot>) {
        let (watch_tx, watch_rx) = watch::channel(initial);
        (Self { watch_tx, feed }, watch_rx)
    }

    /// Mirror a committed transition to both channels.
    pub fn publish(&self, snapshot: GameSnapshot) {
        self.watch_tx.send_replace(snapshot.clone());
        self.feed.publish(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Color;
    use crate::game::{GameConfig, GameState};
    use crate::types::{BoardId, GameId};

    fn snapshot() -> GameSnapshot {
        GameState::new(
            GameId::new(),
            BoardId::new("cell-1"),
            &GameConfig::new(Color::White, 3),
        )
        .unwrap()
        .snapshot()
    }

    #[tokio::test]
    async fn watch_holds_latest_snapshot() {
        let feed = SnapshotFeed::new(8);
        let (publisher, watch_rx) = SnapshotPublisher::new(snapshot(), feed);

        let mut updated = snapshot();
        updated.move_count = 2;
        publisher.publish(updated);

        assert_eq!(watch_rx.borrow().move_count, 2);
    }

    #[tokio::test]
    async fn feed_delivers_to_subscribers() {
        let feed = SnapshotFeed::new(8);
        let mut rx = feed.subscribe();
        let (publisher, _watch_rx) = SnapshotPublisher::new(snapshot(), feed);

        publisher.publish(snapshot());
        let received = rx.recv().await.unwrap();
        assert_eq!(received.move_count, 0);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let feed = SnapshotFeed::new(8);
        feed.publish(snapshot());
    }
}
