//! Dispatch loop: queue → cycle store → persistence, plus render ticks.
//!
//! Three independent intervals run inside one `select!`:
//!
//! - drain (50 ms): accept at most one queued cycle, log pending raw frames
//! - render (200 ms): rebuild the projections only if something changed
//! - status (1 s): report counters
//!
//! Ingestion rate is thereby decoupled from render cost; a burst of frames
//! costs one render per render tick at most.

use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::queue::IngestQueue;
use super::state::{RenderFrame, SharedState};
use crate::storage::CycleLog;
use crate::types::RawFrame;

/// Interval settings for the dispatch loop.
#[derive(Debug, Clone, Copy)]
pub struct DispatchTiming {
    pub drain: Duration,
    pub render: Duration,
    pub status: Duration,
}

impl Default for DispatchTiming {
    fn default() -> Self {
        use crate::config::defaults::{DISPATCH_DRAIN_MS, RENDER_INTERVAL_MS, STATUS_INTERVAL_SECS};
        Self {
            drain: Duration::from_millis(DISPATCH_DRAIN_MS),
            render: Duration::from_millis(RENDER_INTERVAL_MS),
            status: Duration::from_secs(STATUS_INTERVAL_SECS),
        }
    }
}

/// Counters returned when the loop exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub cycles_accepted: u64,
    pub cycles_saved: u64,
    pub raw_saved: u64,
    pub save_failures: u64,
    pub renders: u64,
}

/// Owns the consumer side of the ingest handoff.
pub struct DispatchLoop {
    queue: IngestQueue,
    raw_rx: Receiver<RawFrame>,
    state: SharedState,
    log: CycleLog,
    frame_tx: watch::Sender<Arc<RenderFrame>>,
    timing: DispatchTiming,
    cancel_token: CancellationToken,
    stats: DispatchStats,
}

impl DispatchLoop {
    pub fn new(
        queue: IngestQueue,
        raw_rx: Receiver<RawFrame>,
        state: SharedState,
        log: CycleLog,
        frame_tx: watch::Sender<Arc<RenderFrame>>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            queue,
            raw_rx,
            state,
            log,
            frame_tx,
            timing: DispatchTiming::default(),
            cancel_token,
            stats: DispatchStats::default(),
        }
    }

    pub fn with_timing(mut self, timing: DispatchTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Run until cancelled. Returns final counters.
    pub async fn run(mut self) -> DispatchStats {
        let mut drain = tokio::time::interval(self.timing.drain);
        let mut render = tokio::time::interval(self.timing.render);
        let mut status = tokio::time::interval(self.timing.status);
        for timer in [&mut drain, &mut render, &mut status] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }

        info!(
            "⚙️  [Dispatch] Running (drain {} ms, render {} ms)",
            self.timing.drain.as_millis(),
            self.timing.render.as_millis()
        );

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("[Dispatch] Shutdown signal received");
                    break;
                }
                _ = drain.tick() => self.drain_tick().await,
                _ = render.tick() => self.render_tick().await,
                _ = status.tick() => self.status_tick().await,
            }
        }

        info!(
            accepted = self.stats.cycles_accepted,
            saved = self.stats.cycles_saved,
            raw_saved = self.stats.raw_saved,
            failures = self.stats.save_failures,
            renders = self.stats.renders,
            "[Dispatch] Stopped"
        );
        self.stats
    }

    /// Log pending raw frames, then accept at most one cycle.
    pub async fn drain_tick(&mut self) {
        let persist = self.state.persist_enabled();

        // Always drain so the channel never backs up; write only when enabled.
        let pending: Vec<RawFrame> = self.raw_rx.try_iter().collect();
        if persist {
            for raw in &pending {
                if self.log.save_raw(&raw.broker, &raw.topic, &raw.hex_payload).await {
                    self.stats.raw_saved += 1;
                } else {
                    self.stats.save_failures += 1;
                }
            }
        }

        let Some(cycle) = self.queue.drain_one() else {
            return;
        };

        let samples = cycle.samples.clone();
        let counter = self.state.store.write().await.accept(cycle);
        self.stats.cycles_accepted += 1;
        self.state.mark_dirty();

        if persist {
            if self.log.save_cycle(i64::from(counter), &samples).await {
                self.stats.cycles_saved += 1;
            } else {
                self.stats.save_failures += 1;
            }
        }
    }

    /// Rebuild projections if anything changed since the last render.
    pub async fn render_tick(&mut self) {
        if !self.state.take_dirty() {
            return;
        }
        let options = *self.state.view.read().await;
        self.stats.renders += 1;
        let frame = {
            let store = self.state.store.read().await;
            RenderFrame::render(&store, options, self.stats.renders)
        };
        self.frame_tx.send_replace(Arc::new(frame));
    }

    async fn status_tick(&self) {
        let store = self.state.store.read().await;
        debug!(
            counter = store.counter(),
            max_cycles = store.max_cycles(),
            points = store.total_points(),
            queued = self.queue.len(),
            dropped = self.queue.dropped(),
            persist = self.state.persist_enabled(),
            "[Dispatch] Status"
        );
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}
