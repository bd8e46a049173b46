// Consumers of newly ingested readings: durable storage and live views.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::PersistenceError;
use crate::models::Reading;

/// Durable per-user append log of readings.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Writes one reading. Returns only after the row is committed.
    async fn append(&self, user_id: i64, reading: &Reading) -> Result<(), PersistenceError>;

    /// The most recent `limit` readings of a user, oldest first.
    async fn load_recent(&self, user_id: i64, limit: u32)
    -> Result<Vec<Reading>, PersistenceError>;
}

/// Incremental consumer of appended rows (charts, tables, sockets).
/// Fire-and-forget: implementations swallow their own failures.
pub trait ViewSink: Send + Sync {
    fn on_rows_added(&self, rows: &[Reading]);
}

/// Discards every notification.
pub struct NoopViewSink;

impl ViewSink for NoopViewSink {
    fn on_rows_added(&self, _rows: &[Reading]) {}
}

/// Publishes each new row on a broadcast channel; WebSocket viewers subscribe to it.
pub struct BroadcastViewSink {
    tx: broadcast::Sender<Reading>,
}

impl BroadcastViewSink {
    pub fn new(tx: broadcast::Sender<Reading>) -> Self {
        Self { tx }
    }
}

impl ViewSink for BroadcastViewSink {
    fn on_rows_added(&self, rows: &[Reading]) {
        for row in rows {
            // No receivers is normal when nobody watches the live stream.
            if self.tx.send(*row).is_err() {
                tracing::trace!(operation = "broadcast_reading", "no live viewers");
                break;
            }
        }
    }
}
