//! Frame source abstraction for sensor message ingestion.
//!
//! The ingest thread polls a [`FrameSource`] with a short timeout and reacts
//! to the returned [`TransportEvent`]. Two sources exist: the MQTT client
//! used in production and a replay source that yields pre-loaded payloads.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rumqttc::{
    Client, ConnectReturnCode, Connection, ConnectionError, Event, MqttOptions, Packet, QoS,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::decoder::{decode_payload, DecodeError};

/// Transport-level failures. None are fatal; they surface as status text.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid broker target: {0}")]
    InvalidTarget(String),

    #[error("failed to spawn ingest thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Events produced by a frame source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Session established and subscription requested.
    Connected,
    /// Session ended or could not be established.
    Disconnected(String),
    /// One message payload, exactly as received.
    Frame(Vec<u8>),
    /// Nothing arrived within the poll timeout.
    Idle,
}

/// Where ingestion reads from.
///
/// `poll` must return within roughly `timeout` so the ingest thread can
/// observe its stop flag. Reconnection is never automatic: after
/// [`TransportEvent::Disconnected`] the ingest loop exits.
pub trait FrameSource: Send + 'static {
    fn poll(&mut self, timeout: Duration) -> TransportEvent;

    /// Request an orderly disconnect. Best-effort.
    fn disconnect(&mut self);

    fn broker(&self) -> &str;

    fn topic(&self) -> &str;

    /// Human-readable name for logging (e.g. "MQTT", "replay").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Broker target
// ============================================================================

/// One broker/topic pair to ingest from.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BrokerTarget {
    pub host: String,
    pub port: u16,
    pub topic: String,
}

impl BrokerTarget {
    pub fn new(host: impl Into<String>, port: u16, topic: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            topic: topic.into(),
        }
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.host.trim().is_empty() {
            return Err(TransportError::InvalidTarget("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(TransportError::InvalidTarget("port must be non-zero".to_string()));
        }
        if self.topic.trim().is_empty() {
            return Err(TransportError::InvalidTarget("topic is empty".to_string()));
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// MQTT Source
// ============================================================================

/// Synchronous rumqttc session subscribed to one topic at QoS 1.
///
/// The rumqttc event loop runs on its own thread and blocks in `recv`, so a
/// slow CONNACK is never cut short by the ingest poll timeout. Events reach
/// `poll` through a bounded channel. The subscription is requested when the
/// broker acknowledges the connection.
pub struct MqttSource {
    client: Client,
    events: Receiver<Result<Event, ConnectionError>>,
    target: BrokerTarget,
    connected: bool,
}

impl MqttSource {
    pub fn new(
        target: BrokerTarget,
        client_id: &str,
        keep_alive: Duration,
        request_capacity: usize,
    ) -> Result<Self, TransportError> {
        target.validate()?;

        let mut options = MqttOptions::new(client_id, target.host.clone(), target.port);
        options.set_keep_alive(keep_alive);
        options.set_clean_session(true);

        let (client, connection) = Client::new(options, request_capacity);
        let (tx, events) = crossbeam_channel::bounded(request_capacity.max(1));
        std::thread::Builder::new()
            .name("mqtt-eventloop".to_string())
            .spawn(move || drive_event_loop(connection, tx))?;
        info!(broker = %target.address(), topic = %target.topic, "[MQTT] Connecting");

        Ok(Self {
            client,
            events,
            target,
            connected: false,
        })
    }
}

/// Forwards every notification until the first connection error or until
/// the receiving `MqttSource` is dropped. rumqttc would reconnect on the
/// next `recv`; stopping here leaves reconnection to the controller.
fn drive_event_loop(mut connection: Connection, tx: Sender<Result<Event, ConnectionError>>) {
    for notification in connection.iter() {
        let failed = notification.is_err();
        if tx.send(notification).is_err() || failed {
            break;
        }
    }
    debug!("[MQTT] Event loop thread exiting");
}

impl FrameSource for MqttSource {
    fn poll(&mut self, timeout: Duration) -> TransportEvent {
        match self.events.recv_timeout(timeout) {
            Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                if ack.code != ConnectReturnCode::Success {
                    self.connected = false;
                    return TransportEvent::Disconnected(format!(
                        "Connection refused: {:?}",
                        ack.code
                    ));
                }
                if let Err(e) = self.client.try_subscribe(self.target.topic.as_str(), QoS::AtLeastOnce) {
                    warn!(error = %e, "[MQTT] Subscribe request failed");
                    return TransportEvent::Disconnected(format!("Subscribe failed: {}", e));
                }
                self.connected = true;
                TransportEvent::Connected
            }
            Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                TransportEvent::Frame(publish.payload.to_vec())
            }
            Ok(Ok(Event::Incoming(Packet::Disconnect))) => {
                self.connected = false;
                TransportEvent::Disconnected("Broker closed the session".to_string())
            }
            Ok(Ok(event)) => {
                debug!(?event, "[MQTT] Event");
                TransportEvent::Idle
            }
            Ok(Err(e)) => {
                let reason = if self.connected {
                    format!("Connection lost: {}", e)
                } else {
                    format!("Connection failed: {}", e)
                };
                self.connected = false;
                TransportEvent::Disconnected(reason)
            }
            Err(RecvTimeoutError::Timeout) => TransportEvent::Idle,
            Err(RecvTimeoutError::Disconnected) => {
                self.connected = false;
                TransportEvent::Disconnected("Event loop closed".to_string())
            }
        }
    }

    fn disconnect(&mut self) {
        if let Err(e) = self.client.try_unsubscribe(self.target.topic.as_str()) {
            debug!(error = %e, "[MQTT] Unsubscribe request not sent");
        }
        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "[MQTT] Disconnect request not sent");
        }
        self.connected = false;
    }

    fn broker(&self) -> &str {
        &self.target.host
    }

    fn topic(&self) -> &str {
        &self.target.topic
    }

    fn source_name(&self) -> &str {
        "MQTT"
    }
}

// ============================================================================
// Replay Source (captured frames / tests)
// ============================================================================

/// Replays pre-loaded events, then reports idle until stopped.
///
/// With a pacing interval, frames are released no faster than one per
/// interval; otherwise each poll yields the next event at once.
pub struct ReplaySource {
    events: VecDeque<TransportEvent>,
    broker: String,
    topic: String,
    disconnected: bool,
    pacing: Option<Duration>,
    next_due: Option<Instant>,
}

impl ReplaySource {
    /// A connected session delivering `payloads` in order.
    pub fn new(payloads: Vec<Vec<u8>>) -> Self {
        let mut events: VecDeque<TransportEvent> =
            payloads.into_iter().map(TransportEvent::Frame).collect();
        events.push_front(TransportEvent::Connected);
        Self::from_events(events.into())
    }

    /// Arbitrary event script.
    pub fn from_events(events: Vec<TransportEvent>) -> Self {
        Self {
            events: events.into(),
            broker: "replay".to_string(),
            topic: "replay".to_string(),
            disconnected: false,
            pacing: None,
            next_due: None,
        }
    }

    /// Captured frames, one hex payload per line. Blank lines and lines
    /// starting with `#` are skipped.
    pub fn from_capture(text: &str) -> Result<Self, DecodeError> {
        let payloads = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(decode_payload)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(payloads))
    }

    pub fn with_pacing(mut self, interval: Duration) -> Self {
        self.pacing = Some(interval);
        self
    }

    /// Events not yet delivered.
    pub fn remaining(&self) -> usize {
        self.events.len()
    }

    pub fn with_target(mut self, broker: impl Into<String>, topic: impl Into<String>) -> Self {
        self.broker = broker.into();
        self.topic = topic.into();
        self
    }

    pub fn was_disconnected(&self) -> bool {
        self.disconnected
    }
}

impl FrameSource for ReplaySource {
    fn poll(&mut self, timeout: Duration) -> TransportEvent {
        if let (Some(interval), Some(TransportEvent::Frame(_))) = (self.pacing, self.events.front()) {
            let now = Instant::now();
            if let Some(due) = self.next_due.filter(|due| *due > now) {
                std::thread::sleep(timeout.min(due - now));
                return TransportEvent::Idle;
            }
            self.next_due = Some(now + interval);
        }

        match self.events.pop_front() {
            Some(event) => event,
            None => {
                std::thread::sleep(timeout);
                TransportEvent::Idle
            }
        }
    }

    fn disconnect(&mut self) {
        self.disconnected = true;
    }

    fn broker(&self) -> &str {
        &self.broker
    }

    fn topic(&self) -> &str {
        &self.topic
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_yields_connected_then_frames_then_idle() {
        let mut source = ReplaySource::new(vec![vec![0x00, 0x01], vec![0x02]]);
        let tick = Duration::from_millis(1);
        assert_eq!(source.poll(tick), TransportEvent::Connected);
        assert_eq!(source.poll(tick), TransportEvent::Frame(vec![0x00, 0x01]));
        assert_eq!(source.poll(tick), TransportEvent::Frame(vec![0x02]));
        assert_eq!(source.poll(tick), TransportEvent::Idle);
        source.disconnect();
        assert!(source.was_disconnected());
    }

    #[test]
    fn test_capture_skips_comments_and_blank_lines() {
        let capture = "# captured from pub1\n0001ff\n\n  0a0b  \n";
        let mut source = ReplaySource::from_capture(capture).unwrap();
        assert_eq!(source.remaining(), 3);
        let tick = Duration::from_millis(1);
        assert_eq!(source.poll(tick), TransportEvent::Connected);
        assert_eq!(source.poll(tick), TransportEvent::Frame(vec![0x00, 0x01, 0xff]));
        assert_eq!(source.poll(tick), TransportEvent::Frame(vec![0x0a, 0x0b]));

        assert!(ReplaySource::from_capture("zz\n").is_err());
    }

    #[test]
    fn test_pacing_holds_back_frames() {
        let mut source =
            ReplaySource::new(vec![vec![1], vec![2]]).with_pacing(Duration::from_secs(60));
        let tick = Duration::from_millis(1);
        assert_eq!(source.poll(tick), TransportEvent::Connected);
        assert_eq!(source.poll(tick), TransportEvent::Frame(vec![1]));
        // Second frame is not due for another minute
        assert_eq!(source.poll(tick), TransportEvent::Idle);
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn test_target_validation() {
        assert!(BrokerTarget::new("10.0.0.1", 1883, "pub1").validate().is_ok());
        assert!(BrokerTarget::new("", 1883, "pub1").validate().is_err());
        assert!(BrokerTarget::new("h", 0, "pub1").validate().is_err());
        assert!(BrokerTarget::new("h", 1883, " ").validate().is_err());
        assert_eq!(BrokerTarget::new("h", 1883, "t").address(), "h:1883");
    }

    /// Minimal broker: answers each CONNECT with a CONNACK after `delay`
    /// and then holds the socket open. Returns the port and an accept count.
    fn slow_broker(delay: Duration) -> (u16, std::sync::Arc<std::sync::atomic::AtomicUsize>) {
        use std::io::{Read, Write};
        use std::sync::atomic::{AtomicUsize, Ordering};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepts = std::sync::Arc::new(AtomicUsize::new(0));
        let counter = accepts.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::spawn(move || {
                    let mut buf = [0u8; 256];
                    if stream.read(&mut buf).unwrap_or(0) == 0 {
                        return;
                    }
                    std::thread::sleep(delay);
                    if stream.write_all(&[0x20, 0x02, 0x00, 0x00]).is_err() {
                        return;
                    }
                    while stream.read(&mut buf).map(|n| n > 0).unwrap_or(false) {}
                });
            }
        });
        (port, accepts)
    }

    #[test]
    fn test_slow_connack_still_connects_with_short_poll() {
        let (port, accepts) = slow_broker(Duration::from_millis(50));
        let mut source = MqttSource::new(
            BrokerTarget::new("127.0.0.1", port, "pub1"),
            "slow-connack",
            Duration::from_secs(30),
            8,
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut connected = false;
        while Instant::now() < deadline {
            match source.poll(Duration::from_millis(10)) {
                TransportEvent::Connected => {
                    connected = true;
                    break;
                }
                TransportEvent::Disconnected(reason) => panic!("disconnected: {}", reason),
                _ => {}
            }
        }

        assert!(connected);
        assert_eq!(accepts.load(std::sync::atomic::Ordering::SeqCst), 1);
        source.disconnect();
    }

    #[test]
    fn test_mqtt_source_rejects_bad_target() {
        let result = MqttSource::new(
            BrokerTarget::new("", 1883, "pub1"),
            "test",
            Duration::from_secs(30),
            8,
        );
        assert!(matches!(result, Err(TransportError::InvalidTarget(_))));
    }
}
