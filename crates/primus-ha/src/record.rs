//! The persisted lock record and its wire format.
//!
//! One JSON object per lock key lives in the bucket. Its presence means some
//! contender claims leadership; its `Identity` field says which one. Field
//! names are part of the wire contract shared with other implementations,
//! hence the PascalCase rename; decoding tolerates additional fields so
//! future writers can extend the record.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use primus_core::error::{Error, Result};

/// Contents of the persisted lock object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LockRecord {
    /// Logical lock name (also the object name).
    pub key: String,
    /// Caller-supplied payload, typically the leader's advertised address.
    pub value: String,
    /// Unique identity of the contender that wrote this record.
    pub identity: String,
}

impl LockRecord {
    /// Creates a new record.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            identity: identity.into(),
        }
    }

    /// Serializes the record to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if encoding fails.
    pub fn encode(&self) -> Result<Bytes> {
        let body = serde_json::to_vec(self)
            .map_err(|e| Error::serialization(format!("encode lock record: {e}")))?;
        Ok(Bytes::from(body))
    }

    /// Deserializes a record from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the body is not a valid record.
    pub fn decode(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| Error::serialization(format!("decode lock record: {e}")))
    }
}
