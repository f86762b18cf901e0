use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope written to storage: `{ data, version, timestamp }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Serialized state.
    pub data: Value,
    /// Schema version the data was written at.
    pub version: u32,
    /// Write time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl PersistedState {
    /// Wrap `data` at `version`, stamped with the current time.
    pub fn now(data: Value, version: u32) -> Self {
        Self {
            data,
            version,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Text encoding for persisted envelopes.
pub trait Codec: Send + Sync {
    /// Encode an envelope.
    fn encode(&self, entry: &PersistedState) -> Result<String>;

    /// Decode an envelope. Any failure marks the stored entry corrupt.
    fn decode(&self, raw: &str) -> Result<PersistedState>;
}

/// JSON text encoding (the default).
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, entry: &PersistedState) -> Result<String> {
        Ok(serde_json::to_string(entry)?)
    }

    fn decode(&self, raw: &str) -> Result<PersistedState> {
        Ok(serde_json::from_str(raw)?)
    }
}
