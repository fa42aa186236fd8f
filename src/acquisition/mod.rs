//! Sensor data acquisition
//!
//! Handles frame ingestion from the MQTT broker: transport sources, the
//! frame decoder, and the ingest thread that feeds the pipeline queue.

pub mod decoder;
pub mod ingest;
pub mod source;

pub use decoder::{decode, decode_payload, encode_payload, DecodeError};
pub use ingest::{IngestController, IngestHandle, IngestLoop, IngestSettings, IngestStats};
pub use source::{BrokerTarget, FrameSource, MqttSource, ReplaySource, TransportError, TransportEvent};
