//! Live cycle channel over WebSocket.
//!
//! Each observer gets its own [`LiveBroadcaster`]: one snapshot of the most
//! recent cycles on connect, then a push per tick only when rows with an id
//! above the observer's high-water mark have been persisted.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::handlers::MonitorState;
use crate::storage::{CycleLog, StorageError};
use crate::types::CycleRecord;

/// Read side of the persisted cycle log, as seen by live observers.
#[async_trait]
pub trait CycleFeed: Send + Sync {
    /// Latest `count` cycles, oldest first.
    async fn latest_ascending(&self, count: i64) -> Result<Vec<CycleRecord>, StorageError>;

    /// Highest persisted cycle id (0 when empty).
    async fn max_id(&self) -> Result<i64, StorageError>;

    /// Up to `limit` cycles with id above `after_id`, oldest first.
    async fn after(&self, after_id: i64, limit: i64) -> Result<Vec<CycleRecord>, StorageError>;
}

#[async_trait]
impl CycleFeed for CycleLog {
    async fn latest_ascending(&self, count: i64) -> Result<Vec<CycleRecord>, StorageError> {
        self.latest_cycles_ascending(count).await
    }

    async fn max_id(&self) -> Result<i64, StorageError> {
        self.max_cycle_id().await
    }

    async fn after(&self, after_id: i64, limit: i64) -> Result<Vec<CycleRecord>, StorageError> {
        self.cycles_after(after_id, limit).await
    }
}

/// One message on the live channel.
#[derive(Debug, Clone, Serialize)]
pub struct LivePayload {
    pub success: bool,
    pub data: Vec<CycleRecord>,
    pub has_new_data: bool,
}

impl LivePayload {
    fn batch(data: Vec<CycleRecord>) -> Self {
        Self {
            success: true,
            has_new_data: !data.is_empty(),
            data,
        }
    }
}

/// Per-observer high-water mark tracking.
pub struct LiveBroadcaster<F: CycleFeed> {
    feed: F,
    mark: i64,
    fetch_limit: i64,
}

impl<F: CycleFeed> LiveBroadcaster<F> {
    pub fn new(feed: F, fetch_limit: i64) -> Self {
        Self {
            feed,
            mark: 0,
            fetch_limit,
        }
    }

    /// Initial message: the latest `count` cycles.
    ///
    /// The mark is read before the rows, then raised to the highest id in
    /// the snapshot. A row saved between the two reads is either in the
    /// snapshot or above the mark, never skipped.
    pub async fn snapshot(&mut self, count: i64) -> Result<LivePayload, StorageError> {
        let floor = self.feed.max_id().await?;
        let data = self.feed.latest_ascending(count).await?;
        self.mark = data.iter().map(|r| r.id).fold(floor, i64::max);
        Ok(LivePayload::batch(data))
    }

    /// Rows persisted since the last push, or `None` when there are none.
    pub async fn tick(&mut self) -> Result<Option<LivePayload>, StorageError> {
        let data = self.feed.after(self.mark, self.fetch_limit).await?;
        let Some(max_id) = data.iter().map(|r| r.id).max() else {
            return Ok(None);
        };
        self.mark = max_id;
        Ok(Some(LivePayload::batch(data)))
    }

    pub fn mark(&self) -> i64 {
        self.mark
    }
}

/// `GET /ws` - upgrade to the live cycle channel.
pub async fn ws_cycles(ws: WebSocketUpgrade, State(state): State<MonitorState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn send_json(socket: &mut WebSocket, payload: &LivePayload) -> bool {
    let json = match serde_json::to_string(payload) {
        Ok(j) => j,
        Err(e) => {
            warn!("[Live] Failed to serialize payload: {e}");
            return true;
        }
    };
    socket.send(Message::Text(json)).await.is_ok()
}

async fn handle_ws(mut socket: WebSocket, state: MonitorState) {
    debug!("[Live] Observer connected");

    let mut live = LiveBroadcaster::new(state.log.clone(), state.live.fetch_limit);
    match live.snapshot(state.live.snapshot_count).await {
        Ok(payload) => {
            if !send_json(&mut socket, &payload).await {
                debug!("[Live] Observer disconnected (send failed)");
                return;
            }
        }
        Err(e) => warn!(error = %e, "[Live] Initial snapshot failed"),
    }

    let mut ticker = tokio::time::interval(state.live.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match live.tick().await {
                    Ok(Some(payload)) => {
                        if !send_json(&mut socket, &payload).await {
                            debug!("[Live] Observer disconnected (send failed)");
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "[Live] Poll for new cycles failed"),
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("[Live] Observer disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("[Live] Observer disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("[Live] WebSocket error: {e}");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}
