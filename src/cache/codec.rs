//! Serialization contract for stored analysis records.
//!
//! Records are stored as compact JSON text produced by `serde_json`. Any
//! analyzer output type that implements `Serialize` and `DeserializeOwned`
//! and survives a JSON round trip satisfies the contract. Non-finite floats
//! are written as `null` and do not round trip. Maps keyed by anything other
//! than strings or integers fail at encode time.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize a record for storage.
pub fn encode<R: Serialize>(record: &R) -> serde_json::Result<String> {
    serde_json::to_string(record)
}

/// Deserialize a stored record.
pub fn decode<R: DeserializeOwned>(value: &str) -> serde_json::Result<R> {
    serde_json::from_str(value)
}
