//! Cycle and frame types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One decoded sensor message: a single mains period of PD activity.
///
/// Samples are calibrated voltages in mV. An empty sample vector is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    /// Monotonic sequence number assigned at ingestion
    pub sequence_no: u64,
    /// Wall-clock time the message was decoded
    pub created_at: DateTime<Local>,
    /// Calibrated samples (mV)
    pub samples: Vec<f64>,
}

impl Cycle {
    pub fn new(sequence_no: u64, samples: Vec<f64>) -> Self {
        Self {
            sequence_no,
            created_at: Local::now(),
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A transport message exactly as received, before decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    pub received_at: DateTime<Local>,
    pub broker: String,
    pub topic: String,
    /// Lowercase hex of the payload bytes
    pub hex_payload: String,
}

impl RawFrame {
    pub fn new(broker: impl Into<String>, topic: impl Into<String>, hex_payload: String) -> Self {
        Self {
            received_at: Local::now(),
            broker: broker.into(),
            topic: topic.into(),
            hex_payload,
        }
    }

    /// Source identifier used in logs (`broker/topic`).
    pub fn source_id(&self) -> String {
        format!("{}/{}", self.broker, self.topic)
    }
}

/// A persisted cycle row, as served to query consumers and live observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub id: i64,
    /// `YYYY-MM-DD HH:MM:SS.ffffff`, local time
    pub timestamp: String,
    pub cycle_number: i64,
    pub data: Vec<f64>,
}

/// Sort records oldest-first.
///
/// Timestamps are fixed-width, so lexical order is chronological. Ties
/// (two rows within the same microsecond) fall back to row id.
pub fn sort_ascending(records: &mut [CycleRecord]) {
    records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
}
