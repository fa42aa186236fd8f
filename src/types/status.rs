//! Transport and storage status types

use serde::{Deserialize, Serialize};

/// Broker connection state with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub message: String,
}

impl ConnectionStatus {
    pub fn connected(message: impl Into<String>) -> Self {
        Self {
            connected: true,
            message: message.into(),
        }
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self {
            connected: false,
            message: message.into(),
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::disconnected("Not connected")
    }
}

/// Aggregate counts over the persisted log.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DbStats {
    pub cycle_count: i64,
    pub raw_count: i64,
    pub latest_cycle: Option<String>,
    pub earliest_cycle: Option<String>,
}

/// A persisted raw frame row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: i64,
    pub timestamp: String,
    pub broker: String,
    pub topic: String,
    pub raw_data: String,
}
