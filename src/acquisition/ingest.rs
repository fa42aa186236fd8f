//! Ingest thread: services the transport, decodes frames and feeds the queue.
//!
//! The transport client is synchronous, so ingestion runs on a dedicated OS
//! thread instead of a tokio task. It never blocks on its consumers: decoded
//! cycles go through [`IngestQueue::push`] and raw frames through a bounded
//! channel with `try_send`, both dropping on overflow.

use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::decoder::{decode, encode_payload};
use super::source::{BrokerTarget, FrameSource, MqttSource, TransportError, TransportEvent};
use crate::config::defaults::MQTT_REQUEST_CAPACITY;
use crate::config::MonitorConfig;
use crate::pipeline::queue::{IngestQueue, PushOutcome};
use crate::types::{ConnectionStatus, Cycle, RawFrame};

const JOIN_POLL: Duration = Duration::from_millis(10);

/// Counters reported when an ingest thread exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub frames_received: u64,
    pub cycles_queued: u64,
    pub cycles_dropped: u64,
    pub decode_errors: u64,
    pub raw_dropped: u64,
}

// ============================================================================
// Ingest Loop
// ============================================================================

/// Everything one ingest thread owns.
pub struct IngestLoop<S: FrameSource> {
    source: S,
    queue: IngestQueue,
    raw_tx: Sender<RawFrame>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    stop: Arc<AtomicBool>,
    sequence: Arc<AtomicU64>,
    poll_interval: Duration,
    stats: IngestStats,
}

impl<S: FrameSource> IngestLoop<S> {
    pub fn new(
        source: S,
        queue: IngestQueue,
        raw_tx: Sender<RawFrame>,
        status_tx: Arc<watch::Sender<ConnectionStatus>>,
        sequence: Arc<AtomicU64>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            queue,
            raw_tx,
            status_tx,
            stop: Arc::new(AtomicBool::new(false)),
            sequence,
            poll_interval,
            stats: IngestStats::default(),
        }
    }

    /// Run on a new named thread.
    pub fn spawn(self) -> Result<IngestHandle, TransportError> {
        let stop = Arc::clone(&self.stop);
        let thread = std::thread::Builder::new()
            .name("pd-ingest".to_string())
            .spawn(move || self.run())?;
        Ok(IngestHandle {
            stop,
            thread: Some(thread),
        })
    }

    /// Poll until the stop flag is set or the transport disconnects.
    pub fn run(mut self) -> IngestStats {
        info!(
            "📡 [Ingest] Reading frames from {} ({}/{})",
            self.source.source_name(),
            self.source.broker(),
            self.source.topic()
        );

        while !self.stop.load(Ordering::Acquire) {
            match self.source.poll(self.poll_interval) {
                TransportEvent::Connected => {
                    info!("[Ingest] Connected to {}", self.source.broker());
                    self.status_tx.send_replace(ConnectionStatus::connected(format!(
                        "Connected to {}",
                        self.source.broker()
                    )));
                }
                TransportEvent::Disconnected(reason) => {
                    warn!("[Ingest] {}", reason);
                    self.status_tx
                        .send_replace(ConnectionStatus::disconnected(reason));
                    break;
                }
                TransportEvent::Frame(payload) => self.handle_frame(&payload),
                TransportEvent::Idle => {}
            }
        }

        if self.stop.load(Ordering::Acquire) {
            self.source.disconnect();
            self.status_tx
                .send_replace(ConnectionStatus::disconnected("Disconnected"));
        }

        info!(
            frames = self.stats.frames_received,
            queued = self.stats.cycles_queued,
            dropped = self.stats.cycles_dropped,
            decode_errors = self.stats.decode_errors,
            "[Ingest] Stopped"
        );
        self.stats
    }

    fn handle_frame(&mut self, payload: &[u8]) {
        self.stats.frames_received += 1;
        let hex = encode_payload(payload);

        let raw = RawFrame::new(self.source.broker(), self.source.topic(), hex.clone());
        match self.raw_tx.try_send(raw) {
            Ok(()) => {}
            Err(TrySendError::Full(raw)) => {
                self.stats.raw_dropped += 1;
                debug!(source = %raw.source_id(), "[Ingest] Raw frame channel full, frame not logged");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.stats.raw_dropped += 1;
            }
        }

        match decode(&hex) {
            Ok(samples) => {
                let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
                match self.queue.push(Cycle::new(seq, samples)) {
                    PushOutcome::Queued => self.stats.cycles_queued += 1,
                    PushOutcome::Dropped => self.stats.cycles_dropped += 1,
                }
            }
            Err(e) => {
                self.stats.decode_errors += 1;
                warn!(len = hex.len(), "[Ingest] Discarding undecodable frame: {}", e);
            }
        }
    }
}

// ============================================================================
// Ingest Handle
// ============================================================================

/// Owner of a running ingest thread. Dropping it signals the thread to stop.
pub struct IngestHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<IngestStats>>,
}

impl IngestHandle {
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the thread and wait up to `timeout` for it to exit.
    ///
    /// Returns the thread's stats if it finished in time. Otherwise the
    /// thread is detached; it exits on its own at its next poll.
    pub fn stop(mut self, timeout: Duration) -> Option<IngestStats> {
        self.stop.store(true, Ordering::Release);
        let thread = self.thread.take()?;

        let deadline = Instant::now() + timeout;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    "[Ingest] Thread did not stop within {} ms, detaching",
                    timeout.as_millis()
                );
                return None;
            }
            std::thread::sleep(JOIN_POLL);
        }

        match thread.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                warn!("[Ingest] Thread panicked");
                None
            }
        }
    }
}

impl Drop for IngestHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

// ============================================================================
// Ingest Controller
// ============================================================================

/// MQTT session settings shared by every connection attempt.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub client_id: String,
    pub keep_alive: Duration,
    pub request_capacity: usize,
    pub poll_interval: Duration,
    pub stop_timeout: Duration,
}

impl From<&MonitorConfig> for IngestSettings {
    fn from(cfg: &MonitorConfig) -> Self {
        Self {
            client_id: cfg.broker.client_id.clone(),
            keep_alive: Duration::from_secs(cfg.broker.keep_alive_secs),
            request_capacity: MQTT_REQUEST_CAPACITY,
            poll_interval: cfg.dispatch.ingest_poll(),
            stop_timeout: cfg.dispatch.stop_timeout(),
        }
    }
}

/// Starts, stops and swaps the single active ingest thread.
///
/// `connect` and `disconnect` block for up to `stop_timeout` while an old
/// thread winds down; async callers go through `spawn_blocking`.
pub struct IngestController {
    queue: IngestQueue,
    raw_tx: Sender<RawFrame>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    sequence: Arc<AtomicU64>,
    settings: IngestSettings,
    active: Mutex<Option<ActiveIngest>>,
}

struct ActiveIngest {
    target: Option<BrokerTarget>,
    handle: IngestHandle,
}

impl IngestController {
    pub fn new(queue: IngestQueue, raw_tx: Sender<RawFrame>, settings: IngestSettings) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::default());
        Self {
            queue,
            raw_tx,
            status_tx: Arc::new(status_tx),
            sequence: Arc::new(AtomicU64::new(0)),
            settings,
            active: Mutex::new(None),
        }
    }

    /// Connect to `target`, replacing any running session.
    pub fn connect(&self, target: BrokerTarget) -> Result<(), TransportError> {
        target.validate()?;
        self.stop_active();

        let source = MqttSource::new(
            target.clone(),
            &self.settings.client_id,
            self.settings.keep_alive,
            self.settings.request_capacity,
        )?;
        self.status_tx.send_replace(ConnectionStatus::disconnected(format!(
            "Connecting to {}",
            target.address()
        )));
        self.launch(source, Some(target))
    }

    /// Ingest from an arbitrary source, replacing any running session.
    pub fn start<S: FrameSource>(&self, source: S) -> Result<(), TransportError> {
        self.stop_active();
        self.launch(source, None)
    }

    /// Stop the running session and flush queued cycles. Returns `false`
    /// when nothing was running.
    pub fn disconnect(&self) -> bool {
        let stopped = self.stop_active();
        let flushed = self.queue.clear();
        if flushed > 0 {
            debug!(flushed, "[Ingest] Cleared queued cycles on disconnect");
        }
        self.status_tx
            .send_replace(ConnectionStatus::disconnected("Disconnected"));
        stopped
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.active().as_ref().is_some_and(|a| a.handle.is_running())
    }

    pub fn current_target(&self) -> Option<BrokerTarget> {
        self.active().as_ref().and_then(|a| a.target.clone())
    }

    /// Cycles numbered so far across every session.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    fn launch<S: FrameSource>(
        &self,
        source: S,
        target: Option<BrokerTarget>,
    ) -> Result<(), TransportError> {
        let ingest = IngestLoop::new(
            source,
            self.queue.clone(),
            self.raw_tx.clone(),
            Arc::clone(&self.status_tx),
            Arc::clone(&self.sequence),
            self.settings.poll_interval,
        );
        let handle = ingest.spawn()?;
        *self.active() = Some(ActiveIngest { target, handle });
        Ok(())
    }

    fn stop_active(&self) -> bool {
        let previous = self.active().take();
        match previous {
            Some(active) => {
                if let Some(stats) = active.handle.stop(self.settings.stop_timeout) {
                    debug!(?stats, "[Ingest] Previous session stopped");
                }
                true
            }
            None => false,
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveIngest>> {
        self.active.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            warn!("[Ingest] Controller lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl Drop for IngestController {
    fn drop(&mut self) {
        self.stop_active();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::source::ReplaySource;
    use crossbeam_channel::bounded;

    fn frame(body: &[u16]) -> Vec<u8> {
        // 4 header words + body + 1 trailer word
        let mut words = vec![0u16; 4];
        words.extend_from_slice(body);
        words.push(0xffff);
        words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    fn settings() -> IngestSettings {
        IngestSettings {
            client_id: "test".to_string(),
            keep_alive: Duration::from_secs(30),
            request_capacity: 8,
            poll_interval: Duration::from_millis(1),
            stop_timeout: Duration::from_secs(1),
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_loop_decodes_queues_and_forwards_raw() {
        let queue = IngestQueue::new(10);
        let (raw_tx, raw_rx) = bounded(10);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let source = ReplaySource::new(vec![frame(&[0x0800, 0x0000]), vec![0x01, 0x02, 0x03]])
            .with_target("10.0.0.9", "pub1");

        let handle = IngestLoop::new(
            source,
            queue.clone(),
            raw_tx,
            Arc::new(status_tx),
            Arc::new(AtomicU64::new(0)),
            Duration::from_millis(1),
        )
        .spawn()
        .unwrap();

        wait_for(|| raw_rx.len() == 2);
        let stats = handle.stop(Duration::from_secs(1)).unwrap();

        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.cycles_queued, 2);
        assert_eq!(stats.decode_errors, 0);

        let first = queue.drain_one().unwrap();
        assert_eq!(first.sequence_no, 1);
        assert_eq!(first.samples, vec![1.65, 0.0]);
        // A 3-byte payload is too short to carry samples
        let second = queue.drain_one().unwrap();
        assert_eq!(second.sequence_no, 2);
        assert!(second.samples.is_empty());

        let raw = raw_rx.try_recv().unwrap();
        assert_eq!(raw.broker, "10.0.0.9");
        assert_eq!(raw.topic, "pub1");
        assert_eq!(raw.hex_payload.len(), 7 * 4);

        assert_eq!(*status_rx.borrow(), ConnectionStatus::disconnected("Disconnected"));
    }

    #[test]
    fn test_disconnect_event_ends_loop_with_reason() {
        let queue = IngestQueue::new(10);
        let (raw_tx, _raw_rx) = bounded(10);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let source = ReplaySource::from_events(vec![
            TransportEvent::Connected,
            TransportEvent::Disconnected("Connection lost: reset".to_string()),
        ]);

        let stats = IngestLoop::new(
            source,
            queue,
            raw_tx,
            Arc::new(status_tx),
            Arc::new(AtomicU64::new(0)),
            Duration::from_millis(1),
        )
        .run();

        assert_eq!(stats, IngestStats::default());
        let status = status_rx.borrow().clone();
        assert!(!status.connected);
        assert_eq!(status.message, "Connection lost: reset");
    }

    #[test]
    fn test_full_queue_counts_drops_without_blocking() {
        let queue = IngestQueue::new(1);
        let (raw_tx, _raw_rx) = bounded(1);
        let (status_tx, _status_rx) = watch::channel(ConnectionStatus::default());
        let mut events: Vec<TransportEvent> = (0..4)
            .map(|_| TransportEvent::Frame(frame(&[0x0100])))
            .collect();
        events.push(TransportEvent::Disconnected("done".to_string()));

        let stats = IngestLoop::new(
            ReplaySource::from_events(events),
            queue.clone(),
            raw_tx,
            Arc::new(status_tx),
            Arc::new(AtomicU64::new(0)),
            Duration::from_millis(1),
        )
        .run();

        assert_eq!(stats.cycles_queued, 1);
        assert_eq!(stats.cycles_dropped, 3);
        assert_eq!(stats.raw_dropped, 3);
        assert_eq!(queue.dropped(), 3);
    }

    #[test]
    fn test_controller_swaps_sessions_and_flushes_on_disconnect() {
        let queue = IngestQueue::new(10);
        let (raw_tx, _raw_rx) = bounded(10);
        let controller = IngestController::new(queue.clone(), raw_tx, settings());
        assert!(!controller.is_running());
        assert!(!controller.disconnect());

        controller
            .start(ReplaySource::new(vec![frame(&[0x0100]), frame(&[0x0200])]))
            .unwrap();
        wait_for(|| queue.len() == 2);
        assert!(controller.is_running());
        assert!(controller.status().connected);

        // A second session continues the sequence numbering
        controller.start(ReplaySource::new(vec![frame(&[0x0300])])).unwrap();
        wait_for(|| queue.len() == 3);
        assert_eq!(controller.sequence(), 3);

        assert!(controller.disconnect());
        assert!(queue.is_empty());
        assert!(!controller.is_running());
        assert_eq!(controller.status(), ConnectionStatus::disconnected("Disconnected"));
    }

    #[test]
    fn test_controller_rejects_invalid_target() {
        let (raw_tx, _raw_rx) = bounded(1);
        let controller = IngestController::new(IngestQueue::new(1), raw_tx, settings());
        let err = controller
            .connect(BrokerTarget::new("", 1883, "pub1"))
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidTarget(_)));
        assert!(controller.current_target().is_none());
    }
}
